//! Framed request/response loop.
//!
//! Single-threaded: one frame in, one response out, in order. Clean EOF is
//! the shutdown signal; every other failure maps to a distinct exit code.

use std::io::{Read, Write};

use rig_transport::FrameError;
use tracing::{error, info};

use crate::context::ProcessContext;
use crate::handlers;

/// Exit codes shared with the CLI contract.
pub const EXIT_OK: u8 = 0;
pub const EXIT_READ_FRAME: u8 = 2;
pub const EXIT_PARSE: u8 = 3;
pub const EXIT_SERIALIZE: u8 = 4;
pub const EXIT_WRITE_FRAME: u8 = 5;

/// Run the dispatcher until EOF or a fatal protocol error. Returns the
/// process exit code.
pub fn run_loop<R: Read, W: Write>(
    context: &ProcessContext,
    input: &mut R,
    output: &mut W,
) -> u8 {
    loop {
        let frame = match rig_transport::read_frame(input) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("EOF on stdin; exiting cleanly");
                context.runtime.stop_physics();
                return EXIT_OK;
            }
            Err(err) => {
                error!("read_frame error: {err}");
                context.runtime.stop_physics();
                return EXIT_READ_FRAME;
            }
        };

        let request = match rig_proto::decode_request(&frame) {
            Ok(request) => request,
            Err(err) => {
                error!("{err}");
                return EXIT_PARSE;
            }
        };

        let response = handlers::handle_request(context, &request);

        let payload = match rig_proto::encode_response(&response) {
            Ok(payload) => payload,
            Err(err) => {
                error!("{err}");
                return EXIT_SERIALIZE;
            }
        };

        if let Err(err) = rig_transport::write_frame(output, &payload) {
            // Oversize responses are a serialization-side failure, not a
            // stream failure.
            let code = match err {
                FrameError::Oversize { .. } | FrameError::ZeroLength => EXIT_SERIALIZE,
                _ => EXIT_WRITE_FRAME,
            };
            error!("write_frame error: {err}");
            return code;
        }
    }
}
