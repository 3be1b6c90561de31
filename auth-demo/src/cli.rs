use std::{ffi::OsString, path::PathBuf};

use clap::{Arg, ArgAction, Command};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Serve {
        bind: Option<String>,
    },
    Bindings {
        out: Option<PathBuf>,
        check: bool,
    },
    Describe,
    Call {
        op: String,
        url: Option<String>,
        login: Option<(String, String)>,
        cookies: Vec<(String, String)>,
    },
}

fn cli() -> Command {
    Command::new("auth-demo")
        .about("Cookie-authenticated RPC demo server and client.")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .action(ArgAction::Set)
                .help("Path to the TOML config. Defaults to ./auth-demo.toml if present."),
        )
        .subcommand(
            Command::new("serve").about("Run the server.").arg(
                Arg::new("bind")
                    .long("bind")
                    .action(ArgAction::Set)
                    .help("The address to listen on."),
            ),
        )
        .subcommand(
            Command::new("bindings")
                .about("Generate the TypeScript client bindings.")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .action(ArgAction::Set)
                        .help("The bindings directory."),
                )
                .arg(
                    Arg::new("check")
                        .long("check")
                        .action(ArgAction::SetTrue)
                        .help("Fail if the bindings on disk are out of date instead of writing them."),
                ),
        )
        .subcommand(Command::new("describe").about("Print the server interface descriptor as JSON."))
        .subcommand(
            Command::new("call")
                .about("Call an operation on a running server.")
                .arg(Arg::new("op").required(true).help("The operation to call."))
                .arg(
                    Arg::new("url")
                        .long("url")
                        .action(ArgAction::Set)
                        .help("The server root. Defaults to the configured bind address."),
                )
                .arg(
                    Arg::new("login")
                        .long("login")
                        .action(ArgAction::Set)
                        .value_name("USER:PASS")
                        .help("Log in before calling."),
                )
                .arg(
                    Arg::new("cookie")
                        .long("cookie")
                        .action(ArgAction::Append)
                        .value_name("NAME=VALUE")
                        .help("Send an extra cookie. May be repeated."),
                ),
        )
}

fn split_pair(s: &str, sep: char, what: &str) -> Result<(String, String), String> {
    match s.split_once(sep) {
        Some((a, b)) if !a.is_empty() => Ok((a.to_owned(), b.to_owned())),
        _ => Err(format!("expected {what}, got {s:?}")),
    }
}

fn invalid(cmd: &mut Command, msg: String) -> clap::Error {
    cmd.error(clap::error::ErrorKind::InvalidValue, msg)
}

pub fn parse_args() -> Result<Args, clap::Error> {
    parse_args_from(std::env::args_os())
}

pub fn parse_args_from<I, T>(args: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut cmd = cli();
    let m = cmd.try_get_matches_from_mut(args)?;
    let config = m.get_one::<String>("config").map(PathBuf::from);

    let action = match m.subcommand() {
        Some(("serve", sub)) => Action::Serve {
            bind: sub.get_one::<String>("bind").cloned(),
        },
        Some(("bindings", sub)) => Action::Bindings {
            out: sub.get_one::<String>("out").map(PathBuf::from),
            check: sub.get_flag("check"),
        },
        Some(("describe", _)) => Action::Describe,
        Some(("call", sub)) => {
            let login = match sub.get_one::<String>("login") {
                Some(s) => {
                    let pair = split_pair(s, ':', "USER:PASS").map_err(|e| invalid(&mut cmd, e))?;
                    Some(pair)
                }
                None => None,
            };
            let cookies = sub
                .get_many::<String>("cookie")
                .into_iter()
                .flatten()
                .map(|s| split_pair(s, '=', "NAME=VALUE"))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(&mut cmd, e))?;
            Action::Call {
                op: sub.get_one::<String>("op").cloned().unwrap_or_default(),
                url: sub.get_one::<String>("url").cloned(),
                login,
                cookies,
            }
        }
        _ => unreachable!("subcommand_required"),
    };

    Ok(Args { config, action })
}
