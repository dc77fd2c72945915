//! Binary entrypoint that follows one conversation and logs new messages.

use std::process::ExitCode;

use feedsync::start_feedsync;

fn main() -> ExitCode {
    start_feedsync::run()
}
