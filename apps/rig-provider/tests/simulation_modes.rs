//! End-to-end checks of the ticking simulation modes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use rig_core::Value;
use rig_proto::{Request, RequestBody, ResponseBody, StatusCode};
use rig_provider::{handlers, startup, ProcessContext};

fn write_file(dir: &PathBuf, name: &str, content: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create temp dir");
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create file");
    file.write_all(content.as_bytes()).expect("write file");
    path
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rig_modes_{tag}_{}", std::process::id()))
}

fn call(context: &ProcessContext, device_id: &str, function_id: u32, args: &[(&str, Value)]) {
    let response = handlers::handle_request(
        context,
        &Request {
            request_id: 1,
            body: RequestBody::Call {
                device_id: device_id.to_string(),
                function_id,
                function_name: String::new(),
                args: args
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect::<BTreeMap<_, _>>(),
            },
        },
    );
    assert_eq!(response.status.code, StatusCode::Ok, "{}", response.status.message);
}

fn read_signal(context: &ProcessContext, device_id: &str, signal_id: &str) -> Value {
    let response = handlers::handle_request(
        context,
        &Request {
            request_id: 2,
            body: RequestBody::ReadSignals {
                device_id: device_id.to_string(),
                signal_ids: vec![signal_id.to_string()],
            },
        },
    );
    assert_eq!(response.status.code, StatusCode::Ok, "{}", response.status.message);
    match response.body {
        ResponseBody::ReadSignals { values, .. } => values[0].value.clone(),
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn non_interacting_heats_with_relays_on() {
    let dir = temp_dir("non_interacting");
    let config = write_file(
        &dir,
        "provider.yaml",
        r#"
devices:
  - id: tc1
    type: tempctl
simulation:
  mode: non_interacting
  tick_rate_hz: 50.0
"#,
    );
    let context = startup(&config, None).expect("startup");

    // Open mode, both relays on: target 23 + 75 = 98 C.
    for relay in [1i64, 2] {
        call(
            &context,
            "tc1",
            3,
            &[("relay_index", Value::Int64(relay)), ("state", Value::Bool(true))],
        );
    }

    let start = read_signal(&context, "tc1", "tc1_temp").as_double().unwrap();
    std::thread::sleep(Duration::from_millis(600));
    let mid = read_signal(&context, "tc1", "tc1_temp").as_double().unwrap();
    std::thread::sleep(Duration::from_millis(600));
    let end = read_signal(&context, "tc1", "tc1_temp").as_double().unwrap();

    assert!(mid > start, "expected heating: {start} -> {mid}");
    assert!(end > mid, "expected continued heating: {mid} -> {end}");
    assert!(end < 98.0, "bounded by the relay target: {end}");

    context.runtime.stop_physics();
}

#[test]
fn physics_mode_drives_sensor_and_fires_rule() {
    let dir = temp_dir("physics");
    write_file(
        &dir,
        "physics.yaml",
        r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
      params:
        thermal_mass: 1000.0
        heat_transfer_coeff: 10.0
        initial_temp: 90.0
  signal_graph:
    - source: environment/ambient_temp
      target: chamber/ambient_temp
    - source: chamber/temperature
      target: tc1/tc1_temp
  rules:
    - id: over_temp
      condition: "chamber/temperature > 80"
      actions:
        - device: relay0
          function: set_relay_ch1
          args:
            enabled: true
"#,
    );
    let config = write_file(
        &dir,
        "provider.yaml",
        r#"
devices:
  - id: tc1
    type: tempctl
  - id: relay0
    type: relayio
simulation:
  mode: physics
  tick_rate_hz: 50.0
  physics_config: physics.yaml
  ambient_temp_c: 25.0
"#,
    );
    let context = startup(&config, None).expect("startup");

    // Physics defers to the readiness barrier.
    let response = handlers::handle_request(
        &context,
        &Request {
            request_id: 3,
            body: RequestBody::WaitReady,
        },
    );
    assert_eq!(response.status.code, StatusCode::Ok);

    std::thread::sleep(Duration::from_millis(400));

    // The graph drives tc1_temp from the model output.
    let temp = read_signal(&context, "tc1", "tc1_temp").as_double().unwrap();
    assert!((temp - 90.0).abs() < 2.0, "tc1_temp {temp}");
    assert!(context.registry.is_physics_driven("tc1/tc1_temp"));

    // E5: the over-temperature rule turned the relay on.
    let relay = read_signal(&context, "relay0", "relay_ch1_state");
    assert_eq!(relay, Value::Bool(true));

    context.runtime.stop_physics();
}

#[test]
fn physics_rules_rejected_with_remote_server() {
    let dir = temp_dir("remote_rules");
    write_file(
        &dir,
        "physics.yaml",
        r#"
physics:
  rules:
    - id: r1
      condition: "m/t > 1"
      actions:
        - device: tc1
          function: set_mode
"#,
    );
    let config = write_file(
        &dir,
        "provider.yaml",
        r#"
devices:
  - id: tc1
    type: tempctl
simulation:
  mode: physics
  tick_rate_hz: 10.0
  physics_config: physics.yaml
"#,
    );
    // Rules plus a remote engine must fail startup, before any connection
    // attempt succeeds or not.
    let result = startup(&config, Some("127.0.0.1:1"));
    assert!(result.is_err());
}
