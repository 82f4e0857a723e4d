//! Request handlers: one response per request, status always set.

use std::collections::BTreeMap;

use rig_proto::{
    DeviceHealth, ProviderHealth, Request, RequestBody, Response, ResponseBody, Status, StatusCode,
};
use tracing::info;

use crate::context::ProcessContext;
use crate::{PROTOCOL_VERSION, PROVIDER_NAME, PROVIDER_VERSION};

/// Route one request. Side effects (starting physics on `wait_ready`) happen
/// here, before the response is written.
pub fn handle_request(context: &ProcessContext, request: &Request) -> Response {
    let id = request.request_id;
    match &request.body {
        RequestBody::Hello { protocol_version } => handle_hello(id, protocol_version),
        RequestBody::WaitReady => handle_wait_ready(context, id),
        RequestBody::ListDevices { .. } => handle_list_devices(context, id),
        RequestBody::DescribeDevice { device_id } => handle_describe_device(context, id, device_id),
        RequestBody::ReadSignals {
            device_id,
            signal_ids,
        } => handle_read_signals(context, id, device_id, signal_ids),
        RequestBody::Call {
            device_id,
            function_id,
            function_name,
            args,
        } => handle_call(context, id, device_id, *function_id, function_name, args),
        RequestBody::GetHealth => handle_get_health(context, id),
        RequestBody::Unknown => Response::empty(
            id,
            Status::new(StatusCode::Unimplemented, "operation not implemented"),
        ),
    }
}

fn handle_hello(id: u64, protocol_version: &str) -> Response {
    if protocol_version != PROTOCOL_VERSION {
        return Response::empty(
            id,
            Status::new(
                StatusCode::FailedPrecondition,
                format!("unsupported protocol_version; expected {PROTOCOL_VERSION}"),
            ),
        );
    }

    Response {
        request_id: id,
        status: Status::ok(),
        body: ResponseBody::Hello {
            protocol_version: PROTOCOL_VERSION.to_string(),
            provider_name: PROVIDER_NAME.to_string(),
            provider_version: PROVIDER_VERSION.to_string(),
            metadata: BTreeMap::from([
                ("transport".to_string(), "stdio+uint32_le".to_string()),
                (
                    "max_frame_bytes".to_string(),
                    rig_transport::MAX_FRAME_BYTES.to_string(),
                ),
                ("supports_wait_ready".to_string(), "true".to_string()),
            ]),
        },
    }
}

fn handle_wait_ready(context: &ProcessContext, id: u64) -> Response {
    // Readiness barrier: physics starts only once the client is ready, so
    // multiple providers sharing a simulator stay phase-aligned.
    info!("wait_ready: starting physics ticker");
    context.runtime.start_physics();

    Response {
        request_id: id,
        status: Status::ok(),
        body: ResponseBody::WaitReady {
            diagnostics: BTreeMap::from([
                ("init_time_ms".to_string(), "0".to_string()),
                (
                    "device_count".to_string(),
                    context.manager.device_ids().len().to_string(),
                ),
                ("provider_impl".to_string(), "sim".to_string()),
            ]),
        },
    }
}

fn handle_list_devices(context: &ProcessContext, id: u64) -> Response {
    Response {
        request_id: id,
        status: Status::ok(),
        body: ResponseBody::ListDevices {
            devices: context.manager.list_devices(),
        },
    }
}

fn handle_describe_device(context: &ProcessContext, id: u64, device_id: &str) -> Response {
    if device_id.is_empty() {
        return Response::empty(
            id,
            Status::new(StatusCode::InvalidArgument, "device_id is required"),
        );
    }

    if !context.manager.is_registered(device_id) {
        return Response::empty(id, Status::new(StatusCode::NotFound, "unknown device_id"));
    }

    // A faulted device still describes, with an empty capability set.
    let capabilities = context.manager.describe_device(device_id).unwrap_or_default();
    let Some(device) = context.manager.device_info(device_id) else {
        return Response::empty(id, Status::new(StatusCode::NotFound, "unknown device_id"));
    };

    Response {
        request_id: id,
        status: Status::ok(),
        body: ResponseBody::DescribeDevice {
            device,
            capabilities,
        },
    }
}

fn handle_read_signals(
    context: &ProcessContext,
    id: u64,
    device_id: &str,
    signal_ids: &[String],
) -> Response {
    if device_id.is_empty() {
        return Response::empty(
            id,
            Status::new(StatusCode::InvalidArgument, "device_id is required"),
        );
    }

    if !context.manager.is_registered(device_id) {
        return Response::empty(
            id,
            Status::new(StatusCode::NotFound, format!("unknown device_id: {device_id}")),
        );
    }

    let values = context.manager.read_signals(device_id, signal_ids);

    if !signal_ids.is_empty() && values.is_empty() {
        // Explicit ids requested and none found.
        return Response::empty(
            id,
            Status::new(
                StatusCode::NotFound,
                "no requested signals found for device",
            ),
        );
    }

    Response {
        request_id: id,
        status: Status::ok(),
        body: ResponseBody::ReadSignals {
            device_id: device_id.to_string(),
            values,
        },
    }
}

fn handle_call(
    context: &ProcessContext,
    id: u64,
    device_id: &str,
    function_id: u32,
    function_name: &str,
    args: &BTreeMap<String, rig_core::Value>,
) -> Response {
    if device_id.is_empty() {
        return Response::empty(
            id,
            Status::new(StatusCode::InvalidArgument, "device_id is required"),
        );
    }
    if function_id == 0 && function_name.is_empty() {
        return Response::empty(
            id,
            Status::new(
                StatusCode::InvalidArgument,
                "function_id or function_name is required",
            ),
        );
    }
    if function_id == 0 {
        // Only function_id routing is part of the base protocol surface.
        return Response::empty(
            id,
            Status::new(
                StatusCode::Unimplemented,
                "function_name lookup not implemented",
            ),
        );
    }

    if !context.manager.is_registered(device_id) {
        return Response::empty(
            id,
            Status::new(StatusCode::NotFound, format!("unknown device_id: {device_id}")),
        );
    }

    match context.manager.call_function(device_id, function_id, args) {
        Ok(()) => Response {
            request_id: id,
            status: Status::ok(),
            body: ResponseBody::Call {
                device_id: device_id.to_string(),
            },
        },
        Err(err) => Response::empty(id, Status::new(err.status_code(), err.to_string())),
    }
}

fn handle_get_health(context: &ProcessContext, id: u64) -> Response {
    let devices = context
        .manager
        .list_devices()
        .into_iter()
        .map(|device| DeviceHealth {
            device_id: device.device_id,
            state: "OK".to_string(),
            message: "ok".to_string(),
            metrics: BTreeMap::from([("impl".to_string(), "sim".to_string())]),
        })
        .collect();

    Response {
        request_id: id,
        status: Status::ok(),
        body: ResponseBody::GetHealth {
            provider: ProviderHealth::ok(),
            devices,
        },
    }
}
