use std::sync::mpsc;

use forkwire_channel::{Channel, ChannelConfig, Value, WorkerCommand, WorkerMessage};
use forkwire_frame::is_goodbye;
use tracing::info;

use crate::cmd::{parse_duration, Globals, LaunchArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_launch_report, print_value, LaunchReport};

pub fn run(args: LaunchArgs, globals: Globals) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let values = collect_values(&args)?;
    let config = ChannelConfig::from_env()
        .map_err(|err| channel_error("invalid configuration", &err))?
        .with_worker(worker_command(&args, globals)?);

    let (tx, rx) = mpsc::channel();
    let channel = Channel::connect(
        &args.medium,
        move |value| {
            let _ = tx.send(value);
        },
        &config,
    )
    .map_err(|err| channel_error("launch failed", &err))?;
    info!(
        worker = ?channel.worker_id(),
        medium = %args.medium.display(),
        "channel opened"
    );

    let sent = values.len();
    for value in values {
        channel.send(value);
    }
    channel.close();

    if !channel.wait_finished(wait_timeout) {
        return Err(CliError::new(
            TIMEOUT,
            format!("worker did not say goodbye within {}", args.wait_timeout),
        ));
    }
    if let Some(failure) = channel.failure() {
        return Err(channel_error("channel failed", &failure.first));
    }

    // The handler thread ends once the reader has stopped.
    let mut received = 0usize;
    while let Ok(value) = rx.recv_timeout(wait_timeout) {
        if is_goodbye(&value) {
            continue;
        }
        print_value(&value, globals.format);
        received = received.saturating_add(1);
    }

    let report = LaunchReport {
        medium: args.medium.display().to_string(),
        worker_id: channel.worker_id(),
        transport: channel.transport(),
        state: channel.state().to_string(),
        sent,
        received,
    };
    print_launch_report(&report, globals.format);
    Ok(SUCCESS)
}

fn collect_values(args: &LaunchArgs) -> CliResult<Vec<Value>> {
    let mut values = Vec::with_capacity(args.json.len() + args.progress.len());
    for raw in &args.json {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        if is_goodbye(&value) {
            return Err(CliError::new(
                USAGE,
                "--json null is reserved for the goodbye frame",
            ));
        }
        values.push(value);
    }
    for raw in &args.progress {
        let message = parse_progress(raw)?;
        values.push(
            message
                .to_value()
                .map_err(|err| channel_error("encode progress failed", &err))?,
        );
    }
    Ok(values)
}

fn parse_progress(raw: &str) -> CliResult<WorkerMessage> {
    let invalid = || CliError::new(USAGE, format!("--progress expects STATE:PERCENT, got {raw:?}"));
    let (state, percent) = raw.rsplit_once(':').ok_or_else(invalid)?;
    if state.is_empty() {
        return Err(invalid());
    }
    let percent: i32 = percent.trim().parse().map_err(|_| invalid())?;
    Ok(WorkerMessage::progress(state, percent))
}

fn worker_command(args: &LaunchArgs, globals: Globals) -> CliResult<WorkerCommand> {
    if let Some(program) = &args.worker {
        return Ok(WorkerCommand::new(program).args(&args.worker_args));
    }

    let exe = std::env::current_exe()
        .map_err(|err| io_error("cannot locate forkwire executable", &err))?;
    Ok(WorkerCommand::new(exe).args([
        "serve",
        "--log-level",
        globals.log_level.as_directive(),
        "--log-format",
        globals.log_format.as_arg(),
        "--format",
        globals.format.as_arg(),
    ]))
}
