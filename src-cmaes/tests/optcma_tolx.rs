use cmaes::{Cmaes, CmaesConfigBuilder};
use cmaes_testfunctions::sphere;
use ndarray::Array1;

#[test]
fn test_tolx_is_the_only_stop_reason() {
    // function-value criteria disabled, so only the tiny TolX threshold can
    // end the run
    let config = CmaesConfigBuilder::new(Array1::from_elem(3, 1.0), Array1::from_elem(3, 0.5))
        .seed(8)
        .stop_tol_fun(0.0)
        .stop_tol_fun_hist(0.0)
        .stop_tol_x(1e-15)
        .stop_max_iter(20_000)
        .stop_max_fun_evals(10_000_000)
        .build();
    let mut es = Cmaes::new(config).unwrap();
    let report = es.run(&sphere);

    let labels: Vec<&str> = es.termination_reasons().iter().map(|r| r.label()).collect();
    assert_eq!(
        labels,
        vec!["TolX"],
        "stop reasons {labels:?}, message: {}",
        report.message
    );
    assert!(report.message.starts_with("TolX:"));
    assert!(report.success);
}
