use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    value_parser, Arg, ArgAction, ArgMatches, Command,
};
use modbus_dev_host::FailPoint;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// Accepts exactly the names `FailPoint` parses from.
fn fail_point_parser() -> impl TypedValueParser<Value = FailPoint> {
    PossibleValuesParser::new(FailPoint::iter().map(<&'static str>::from))
        .try_map(|step| FailPoint::from_str(&step))
}

/// Build the command-line interface
pub fn command() -> Command {
    Command::new("modbus_dev")
        .about("Load the modbus_dev driver into a simulated host and exercise its device node")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("TOML file with driver configuration"),
        )
        .arg(
            Arg::new("opens")
                .long("opens")
                .short('n')
                .value_name("N")
                .default_value("1")
                .value_parser(value_parser!(usize))
                .help("Number of descriptors to open on the node"),
        )
        .arg(
            Arg::new("fail-at")
                .long("fail-at")
                .value_name("STEP")
                .value_parser(fail_point_parser())
                .help("Make this host call fail while loading"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the session report as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log every host call")
                .action(ArgAction::SetTrue),
        )
}

/// Parse command-line arguments
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}
