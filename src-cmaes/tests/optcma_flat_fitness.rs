use cmaes::{Cmaes, CmaesConfigBuilder};
use ndarray::Array1;
use std::sync::{Arc, Mutex};

#[test]
fn test_flat_fitness_inflates_sigma_and_warns_each_generation() {
    let warnings = Arc::new(Mutex::new(0usize));
    let sink = warnings.clone();
    let config = CmaesConfigBuilder::new(Array1::zeros(4), Array1::from_elem(4, 1.0))
        .lambda(8)
        .seed(6)
        .warning_sink(Box::new(move |_msg: &str| {
            *sink.lock().unwrap() += 1;
        }))
        .build();
    let mut es = Cmaes::new(config).unwrap();
    let sigma0 = es.sigma();

    let generations: usize = 12;
    for _ in 0..generations {
        es.sample_population();
        es.update_distribution(&[7.0; 8]);
    }

    // every generation hits the flat-fitness escape, worth at least exp(0.2)
    // net growth even after the regular step-size update
    let growth = es.sigma() / sigma0;
    assert!(
        growth >= (0.2 * generations as f64).exp() * 0.999,
        "sigma grew only by a factor of {growth}"
    );
    assert_eq!(*warnings.lock().unwrap(), generations);
}
