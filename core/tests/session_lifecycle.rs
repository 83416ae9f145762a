mod common;

use anyhow::Result;
use common::{load_count, MockEngine};
use fluid_infer::{
    create_session, FlatTensor, InferError, Place, Predictor, Session, SessionConfig,
    VariableStrategy,
};

#[test]
fn init_from_model_dir_reads_targets() -> Result<()> {
    let config = SessionConfig::from_model_dir("/models/affine_init");
    let session = Session::<MockEngine>::init(config)?;

    assert_eq!(session.feed_target_names(), &["x".to_string()]);
    assert_eq!(
        session.fetch_target_names(),
        &["y".to_string(), "runs".to_string()]
    );
    assert_eq!(session.place(), Place::Cpu);
    assert_eq!(session.variable_strategy(), VariableStrategy::PerRun);
    assert_eq!(load_count("affine_init"), 1);
    Ok(())
}

#[test]
fn init_from_program_and_param_files() -> Result<()> {
    let config = SessionConfig::from_files("/models/affine_files", "/models/params");
    let mut session = create_session::<MockEngine>(config)?;

    let outputs = session.run(&[FlatTensor::from_f32(vec![2], &[1.5, -3.0])])?;
    // Combined parameter files load weight 2.0 in the mock engine.
    assert_eq!(outputs[0].to_f32_vec()?, vec![3.0, -6.0]);
    Ok(())
}

#[test]
fn init_places_on_accelerator() -> Result<()> {
    let config = SessionConfig {
        device: 1,
        ..SessionConfig::from_model_dir("/models/affine_gpu")
    };
    let session = create_session::<MockEngine>(config)?;
    assert_eq!(session.place(), Place::Gpu(1));

    let clone = session.try_clone()?;
    assert_eq!(clone.place(), Place::Gpu(1));
    Ok(())
}

#[test]
fn init_without_model_location_is_config_error() {
    let err = Session::<MockEngine>::init(SessionConfig::default())
        .err()
        .expect("init must fail");
    assert!(matches!(err, InferError::Config(_)));
}

#[test]
fn init_reports_load_failure() {
    let err = create_session::<MockEngine>(SessionConfig::from_model_dir("/models/missing"))
        .err()
        .expect("init must fail");
    assert!(matches!(err, InferError::ModelLoad(_)));
}

#[test]
fn init_rejects_duplicate_targets() {
    let err = create_session::<MockEngine>(SessionConfig::from_model_dir("/models/duplicate"))
        .err()
        .expect("init must fail");
    assert!(matches!(err, InferError::ModelLoad(_)));
}

#[test]
fn per_run_strategy_recreates_variables() -> Result<()> {
    let config = SessionConfig::from_model_dir("/models/affine_per_run");
    let mut session = create_session::<MockEngine>(config)?;
    let x = FlatTensor::from_f32(vec![1], &[1.0]);

    for _ in 0..3 {
        let outputs = session.run(std::slice::from_ref(&x))?;
        assert_eq!(outputs[1].to_f32_vec()?, vec![1.0]);
    }
    Ok(())
}

#[test]
fn shared_strategy_keeps_variables_across_runs() -> Result<()> {
    let config = SessionConfig {
        share_variables: true,
        ..SessionConfig::from_model_dir("/models/affine_shared")
    };
    let mut session = create_session::<MockEngine>(config)?;
    assert_eq!(session.variable_strategy(), VariableStrategy::Shared);
    let x = FlatTensor::from_f32(vec![1], &[1.0]);

    for expected in 1..=3 {
        let outputs = session.run(std::slice::from_ref(&x))?;
        assert_eq!(outputs[1].to_f32_vec()?, vec![expected as f32]);
    }
    Ok(())
}

#[test]
fn clone_reloads_program_into_new_scope() -> Result<()> {
    let config = SessionConfig {
        share_variables: true,
        ..SessionConfig::from_model_dir("/models/affine_clone")
    };
    let mut original = create_session::<MockEngine>(config)?;
    let x = FlatTensor::from_f32(vec![1], &[4.0]);
    original.run(std::slice::from_ref(&x))?;
    original.run(std::slice::from_ref(&x))?;

    let mut clone = original.try_clone()?;
    assert_eq!(load_count("affine_clone"), 2);
    assert_eq!(clone.config(), original.config());
    assert_eq!(clone.feed_target_names(), original.feed_target_names());

    // The clone's scope starts fresh; the original keeps counting.
    let cloned = clone.run(std::slice::from_ref(&x))?;
    assert_eq!(cloned[1].to_f32_vec()?, vec![1.0]);
    let again = original.run(std::slice::from_ref(&x))?;
    assert_eq!(again[1].to_f32_vec()?, vec![3.0]);
    Ok(())
}

#[test]
fn predictor_trait_object_runs_and_clones() -> Result<()> {
    let config = SessionConfig::from_model_dir("/models/affine_dyn");
    let session = create_session::<MockEngine>(config)?;
    let mut predictor: Box<dyn Predictor> = Box::new(session);
    let mut cloned = predictor.clone_predictor()?;

    let x = [FlatTensor::from_f32(vec![3], &[1.0, 2.0, 3.0])];
    let a = predictor.run(&x)?;
    let b = cloned.run(&x)?;
    assert_eq!(a, b);
    assert_eq!(cloned.fetch_target_names(), predictor.fetch_target_names());
    Ok(())
}
