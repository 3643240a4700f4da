use cmaes::{Cmaes, CmaesConfigBuilder};
use cmaes_testfunctions::{create_bounds, sphere};
use ndarray::{Array2, ArrayView1};

fn in_box(x: ArrayView1<f64>, bounds: &Array2<f64>) -> bool {
    x.iter()
        .enumerate()
        .all(|(i, &v)| v >= bounds[[0, i]] && v <= bounds[[1, i]])
}

#[test]
fn test_resampling_keeps_offspring_inside_bounds() {
    // caller-driven box handling: reject-and-resample offspring that leave
    // the feasible box
    let bounds = create_bounds(5, -4.0, 4.0);
    let config = CmaesConfigBuilder::new(
        ndarray::Array1::from_elem(5, 1.0),
        ndarray::Array1::from_elem(5, 0.3),
    )
    .seed(19)
    .build();
    let mut es = Cmaes::new(config).unwrap();
    let lambda = es.lambda();
    let mut fitness = vec![0.0; lambda];

    for _ in 0..20 {
        es.sample_population();
        for k in 0..lambda {
            let mut tries = 0;
            while !in_box(es.population().row(k), &bounds) && tries < 100 {
                es.resample_single(k);
                tries += 1;
            }
            assert!(
                in_box(es.population().row(k), &bounds),
                "offspring {k} stayed infeasible"
            );
            fitness[k] = sphere(&es.population().row(k).to_owned());
        }
        es.update_distribution(&fitness);
    }

    assert!(es.best_fitness_ever() < 1.0);
    assert!(in_box(es.x_best_ever().view(), &bounds));
}
