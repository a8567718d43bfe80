use ship_frame::{FORMAT_JSON_UTF8, PROTOCOL_ID, PROTOCOL_VERSION};
use ship_transport::SHIP_SUBPROTOCOL;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ship {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ship");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("SHIP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("websocket_subprotocol: {SHIP_SUBPROTOCOL}");
    println!("protocol_version: {PROTOCOL_VERSION}");
    println!("message_format: {FORMAT_JSON_UTF8}");
    println!("data_protocol_id: {PROTOCOL_ID}");
    println!(
        "features: peer={}, cli=true",
        cfg!(feature = "peer"),
    );

    Ok(SUCCESS)
}
