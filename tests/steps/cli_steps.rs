//! Behavioural test steps for the CLI argument parser.
//!
//! These steps drive the Cucumber scenarios that verify valid and
//! invalid command lines, including the `--socket` and
//! `--no-auto-remvault` flags.

use clap::Parser;
use cucumber::{World, given, then, when};
use std::ffi::OsString;
use std::path::PathBuf;

use remcli::Args;

#[derive(Debug, Default, World)]
pub struct CliWorld {
    args: Option<Vec<OsString>>,
    result: Option<Result<Args, clap::Error>>,
}

impl CliWorld {
    fn parsed(&self) -> &Args {
        match self.result.as_ref() {
            Some(Ok(args)) => args,
            other => panic!("expected parsed args, got {other:?}"),
        }
    }
}

#[given(regex = r#"^CLI arguments \"(.*)\"$"#)]
fn cli_arguments(world: &mut CliWorld, line: String) {
    let args = std::iter::once("remcli")
        .chain(line.split_whitespace())
        .map(OsString::from)
        .collect();
    world.args = Some(args);
}

#[when("they are parsed")]
#[expect(clippy::expect_used, reason = "simplify test failure output")]
fn they_are_parsed(world: &mut CliWorld) {
    let args = world
        .args
        .clone()
        .expect("world.args should be set by a given step");
    world.result = Some(Args::try_parse_from(args));
}

#[then("parsing succeeds")]
fn parsing_succeeds(world: &mut CliWorld) {
    let _ = world.parsed();
}

#[then("an error is returned")]
fn an_error_is_returned(world: &mut CliWorld) {
    match world.result.take() {
        Some(Err(_)) => {}
        other => panic!("expected error, got {other:?}"),
    }
}

#[then(regex = r#"^the forwarded command is \"(.+)\"$"#)]
fn the_forwarded_command_is(world: &mut CliWorld, expected: String) {
    let request = world.parsed().request();
    let mut words = vec![request.command];
    words.extend(request.args);
    assert_eq!(words.join(" "), expected);
}

#[then("auto-launch is enabled")]
fn auto_launch_is_enabled(world: &mut CliWorld) {
    assert!(world.parsed().auto_launch());
}

#[then("auto-launch is disabled")]
fn auto_launch_is_disabled(world: &mut CliWorld) {
    assert!(!world.parsed().auto_launch());
}

#[then(regex = r#"^the socket path is \"(.+)\"$"#)]
fn the_socket_path_is(world: &mut CliWorld, expected: String) {
    assert_eq!(world.parsed().socket, PathBuf::from(expected));
}
