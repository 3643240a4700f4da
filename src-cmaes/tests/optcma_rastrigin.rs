use cmaes::{Cmaes, CmaesConfigBuilder};
use cmaes_testfunctions::rastrigin;
use ndarray::Array1;

#[test]
fn test_cma_rastrigin_20d_terminates_cleanly() {
    // Highly multimodal; runs either hit the fitness target or use up the
    // generation budget. Checked across several seeds.
    let xstart = Array1::from_shape_fn(20, |i| 2.0 * ((i as f64) * 0.7).sin());
    let initial_fitness = rastrigin(&xstart);

    for seed in [1u64, 2, 3] {
        let config = CmaesConfigBuilder::new(xstart.clone(), Array1::from_elem(20, 3.0))
            .seed(seed)
            .stop_fitness(1.0)
            .stop_max_iter(400)
            .build();
        let mut es = Cmaes::new(config).unwrap();
        let report = es.run(&rastrigin);

        let labels: Vec<&str> = es.termination_reasons().iter().map(|r| r.label()).collect();
        assert!(
            labels.contains(&"Fitness") || labels.contains(&"MaxIter"),
            "seed {seed} stopped with {labels:?}"
        );
        assert!(
            report.fun < initial_fitness,
            "seed {seed} made no progress: {} vs {}",
            report.fun,
            initial_fitness
        );
    }
}
