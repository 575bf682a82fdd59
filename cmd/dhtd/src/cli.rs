//! Command-line surface (spec §6: "consumed, not designed here" beyond this
//! thin wiring layer). Grounded in `ethrex/src/cli.rs`'s `Arg`/`Command`
//! builder style; option names follow `original_source/src/conf.c`'s
//! `dhtd_usage_str` where a direct equivalent exists.

use clap::{Arg, ArgAction, Command};

pub fn cli() -> Command {
    Command::new("dhtd")
        .about("Standalone Mainline-BitTorrent-DHT-compatible node")
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .default_value("6881")
                .action(ArgAction::Set)
                .help("Bind the DHT UDP socket(s) to this port"),
        )
        .arg(
            Arg::new("ipv4")
                .long("ipv4")
                .short('4')
                .action(ArgAction::SetTrue)
                .help("IPv4-only mode"),
        )
        .arg(
            Arg::new("ipv6")
                .long("ipv6")
                .short('6')
                .action(ArgAction::SetTrue)
                .help("IPv6-only mode"),
        )
        .arg(
            Arg::new("bind-addr")
                .long("bind-addr")
                .value_name("ADDRESS")
                .action(ArgAction::Set)
                .help("Local address to bind the DHT socket(s) to (default: any)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .action(ArgAction::Set)
                .help("Plain-text config file, one `key value` pair per line, `#` comments"),
        )
        .arg(
            Arg::new("announce")
                .long("announce")
                .value_name("ID[:PORT]")
                .action(ArgAction::Append)
                .help("Announce this id (and optional port) for the life of the process. Repeatable."),
        )
        .arg(
            Arg::new("peer")
                .long("peer")
                .value_name("ADDRESS[:PORT]")
                .action(ArgAction::Append)
                .help("Ping this address as a bootstrap contact at startup. Repeatable."),
        )
        .arg(
            Arg::new("peerfile")
                .long("peerfile")
                .value_name("FILE")
                .action(ArgAction::Set)
                .help("Import peers from this file at startup, export to it on shutdown"),
        )
        .arg(
            Arg::new("execute")
                .long("execute")
                .value_name("FILE")
                .action(ArgAction::Set)
                .help("Program invoked as `<file> <id_hex> <contact>` for each novel search result"),
        )
        .arg(
            Arg::new("cmd-path")
                .long("cmd-path")
                .value_name("PATH")
                .action(ArgAction::Set)
                .help("Unix-domain socket path for the local control surface"),
        )
        .arg(
            Arg::new("verbosity")
                .long("verbosity")
                .value_name("LEVEL")
                .default_value("verbose")
                .action(ArgAction::Set)
                .help("quiet, verbose, or debug"),
        )
}
