//! Validation tests for the mode matrix, transform parameters, and rules.

use rig_config::schema::{PhysicsFile, ProviderConfig};
use rig_config::{validate_physics, validate_provider, SimulationMode, ValidationError};

fn provider(yaml: &str) -> ProviderConfig {
    serde_yaml::from_str(yaml).expect("provider yaml parses")
}

fn physics(yaml: &str) -> rig_config::PhysicsDef {
    let file: PhysicsFile = serde_yaml::from_str(yaml).expect("physics yaml parses");
    file.physics
}

#[test]
fn inert_mode_minimal_config_is_valid() {
    let config = provider(
        r#"
devices:
  - id: tc1
    type: tempctl
simulation:
  mode: inert
"#,
    );
    assert_eq!(config.simulation.mode, SimulationMode::Inert);
    validate_provider(&config).unwrap();
}

#[test]
fn sim_is_an_alias_for_physics() {
    let config = provider(
        r#"
simulation:
  mode: sim
  tick_rate_hz: 10.0
  physics_config: physics.yaml
"#,
    );
    assert_eq!(config.simulation.mode, SimulationMode::Physics);
    validate_provider(&config).unwrap();
}

#[test]
fn non_interacting_requires_tick_rate() {
    let config = provider("simulation:\n  mode: non_interacting\n");
    assert!(matches!(
        validate_provider(&config),
        Err(ValidationError::TickRateRequired { .. })
    ));
}

#[test]
fn non_interacting_forbids_physics_config() {
    let config = provider(
        "simulation:\n  mode: non_interacting\n  tick_rate_hz: 10.0\n  physics_config: p.yaml\n",
    );
    assert!(matches!(
        validate_provider(&config),
        Err(ValidationError::PhysicsConfigForbidden { .. })
    ));
}

#[test]
fn inert_forbids_tick_rate() {
    let config = provider("simulation:\n  mode: inert\n  tick_rate_hz: 1.0\n");
    assert!(matches!(
        validate_provider(&config),
        Err(ValidationError::TickRateForbidden { .. })
    ));
}

#[test]
fn physics_requires_physics_config() {
    let config = provider("simulation:\n  mode: physics\n  tick_rate_hz: 10.0\n");
    assert!(matches!(
        validate_provider(&config),
        Err(ValidationError::PhysicsConfigRequired { .. })
    ));
}

#[test]
fn tick_rate_bounds_enforced() {
    for rate in ["0.05", "1500.0"] {
        let config = provider(&format!(
            "simulation:\n  mode: non_interacting\n  tick_rate_hz: {rate}\n"
        ));
        assert!(
            matches!(
                validate_provider(&config),
                Err(ValidationError::TickRateOutOfRange { .. })
            ),
            "rate {rate} accepted"
        );
    }
}

#[test]
fn physics_bindings_rejected_outside_physics_mode() {
    let config = provider(
        r#"
devices:
  - id: tc1
    type: tempctl
    physics_bindings:
      tc1_temp: chamber/temperature
simulation:
  mode: inert
"#,
    );
    assert!(matches!(
        validate_provider(&config),
        Err(ValidationError::PhysicsBindingsForbidden { .. })
    ));
}

#[test]
fn duplicate_device_ids_rejected() {
    let config = provider(
        r#"
devices:
  - id: tc1
    type: tempctl
  - id: tc1
    type: motorctl
simulation:
  mode: inert
"#,
    );
    assert!(matches!(
        validate_provider(&config),
        Err(ValidationError::DuplicateDevice { .. })
    ));
}

#[test]
fn duplicate_model_ids_rejected() {
    let def = physics(
        r#"
physics:
  models:
    - id: m1
      type: thermal_mass
    - id: m1
      type: thermal_mass
"#,
    );
    assert!(matches!(
        validate_physics(&def),
        Err(ValidationError::DuplicateModel { .. })
    ));
}

#[test]
fn duplicate_edges_rejected() {
    let def = physics(
        r#"
physics:
  signal_graph:
    - source: a/x
      target: m1/y
    - source: a/x
      target: m1/y
"#,
    );
    assert!(matches!(
        validate_physics(&def),
        Err(ValidationError::DuplicateEdge { .. })
    ));
}

#[test]
fn unknown_transform_type_fails_at_parse() {
    let result: Result<PhysicsFile, _> = serde_yaml::from_str(
        r#"
physics:
  signal_graph:
    - source: a/x
      target: b/y
      transform:
        type: quantum_smoother
        strength: 11
"#,
    );
    assert!(result.is_err());
}

#[test]
fn transform_parameter_constraints() {
    let cases = [
        ("first_order_lag", "tau_s: 0.0"),
        ("noise", "amplitude: -1.0\n        seed: 7"),
        ("saturation", "min: 2.0\n        max: 1.0"),
        (
            "linear",
            "scale: 1.0\n        clamp_min: 5.0\n        clamp_max: 1.0",
        ),
        ("deadband", "threshold: -0.5"),
        ("rate_limiter", "max_rate_per_sec: 0.0"),
        ("delay", "delay_sec: -1.0"),
        ("moving_average", "window_size: 0"),
    ];
    for (kind, params) in cases {
        let yaml = format!(
            r#"
physics:
  signal_graph:
    - source: a/x
      target: b/y
      transform:
        type: {kind}
        {params}
"#
        );
        let def = physics(&yaml);
        assert!(
            matches!(
                validate_physics(&def),
                Err(ValidationError::TransformParam { .. })
            ),
            "{kind} params accepted: {params}"
        );
    }
}

#[test]
fn valid_transforms_pass() {
    let def = physics(
        r#"
physics:
  signal_graph:
    - source: a/x
      target: b/y
      transform:
        type: first_order_lag
        tau_s: 2.0
        initial_value: 25.0
    - source: a/x
      target: b/z
      transform:
        type: linear
        scale: 75.0
        offset: 1.0
    - source: a/y
      target: b/w
      transform:
        type: delay
        delay_sec: 0.5
        buffer_size: 64
"#,
    );
    validate_physics(&def).unwrap();
}

#[test]
fn rule_validation() {
    let bad_condition = physics(
        r#"
physics:
  rules:
    - id: r1
      condition: "just_a_name > 5"
      actions:
        - device: relay0
          function: set_relay_ch1
"#,
    );
    assert!(matches!(
        validate_physics(&bad_condition),
        Err(ValidationError::RuleCondition { .. })
    ));

    let bad_policy = physics(
        r#"
physics:
  rules:
    - id: r1
      condition: "m/t > 5"
      on_error: abort
      actions:
        - device: relay0
          function: set_relay_ch1
"#,
    );
    assert!(matches!(
        validate_physics(&bad_policy),
        Err(ValidationError::RuleOnError { .. })
    ));

    let duplicate = physics(
        r#"
physics:
  rules:
    - id: r1
      condition: "m/t > 5"
      actions:
        - device: relay0
          function: set_relay_ch1
    - id: r1
      condition: "m/t < 5"
      actions:
        - device: relay0
          function: set_relay_ch2
"#,
    );
    assert!(matches!(
        validate_physics(&duplicate),
        Err(ValidationError::DuplicateRule { .. })
    ));

    let good = physics(
        r#"
physics:
  rules:
    - id: r1
      condition: "chamber_thermal/temperature > 80"
      actions:
        - device: relay0
          function: set_relay_ch1
          args:
            enabled: true
"#,
    );
    validate_physics(&good).unwrap();
    assert_eq!(good.rules[0].on_error, "log_and_continue");
}
