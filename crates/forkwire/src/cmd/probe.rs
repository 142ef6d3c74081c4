use forkwire_channel::Medium;

use crate::cmd::ProbeArgs;
use crate::exit::{channel_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_probe_report, OutputFormat, ProbeReport};

/// Exits with FAILURE when the worker has not signalled readiness yet.
pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let medium = Medium::new(&args.medium).map_err(|err| channel_error("invalid medium", &err))?;

    if !medium.is_ready() {
        print_probe_report(&ProbeReport::new(medium.path(), false, None), format);
        return Ok(FAILURE);
    }

    let port = medium
        .read_port()
        .map_err(|err| channel_error("read port failed", &err))?;
    print_probe_report(&ProbeReport::new(medium.path(), true, Some(port)), format);
    Ok(SUCCESS)
}
