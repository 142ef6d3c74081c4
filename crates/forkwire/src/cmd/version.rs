use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("forkwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: forkwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("FORKWIRE_BUILD_TARGET").unwrap_or("unknown"));
    println!("profile: {}", option_env!("FORKWIRE_BUILD_PROFILE").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: channel={}, async={}, cli=true",
        cfg!(feature = "channel"),
        cfg!(feature = "async")
    );
    println!(
        "transports: tcp-loopback{}",
        if cfg!(unix) { ", mmap-ring" } else { "" }
    );

    Ok(SUCCESS)
}
