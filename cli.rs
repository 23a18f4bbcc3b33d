/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use bpaf::Bpaf;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::address_key;
use crate::headless::HeadlessBrowser;
use crate::host::{HostError, TabHost};
use crate::launch_context::LaunchContextBroker;
use crate::orchestrator::{Orchestrator, Response};
use crate::persistence::{DisabledStore, KeyValueStore, RedbDatabase, StoreError};
use crate::prefs::{Preferences, PrefsError, default_prefs_path};
use crate::rules::{RuleStore, RuleStoreError};

/// Lock tab titles, keep saved rename rules, and group tabs.
#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
pub struct Options {
    /// Preferences file to read instead of the default location
    #[bpaf(long("config"), argument("PATH"))]
    pub config: Option<PathBuf>,
    /// Directory holding the rule database
    #[bpaf(long("data-dir"), argument("DIR"))]
    pub data_dir: Option<PathBuf>,
    /// Log filter directives, e.g. `retitle=debug`
    #[bpaf(long("log-filter"), argument("FILTER"))]
    pub log_filter: Option<String>,
    #[bpaf(external(command))]
    pub command: Command,
}

#[derive(Debug, Clone, Bpaf)]
pub enum Command {
    /// Print the rule key for an address
    #[bpaf(command("key"))]
    Key {
        #[bpaf(positional("ADDRESS"))]
        address: String,
    },
    /// Inspect or edit saved rename rules
    #[bpaf(command("rules"))]
    Rules(#[bpaf(external(rules_command))] RulesCommand),
    /// Answer newline-delimited JSON requests on stdin
    #[bpaf(command("serve"))]
    Serve {
        /// Open a tab at ADDRESS before reading requests
        #[bpaf(long("tab"), argument("ADDRESS"))]
        tabs: Vec<String>,
    },
}

#[derive(Debug, Clone, Bpaf)]
pub enum RulesCommand {
    /// List saved rules
    #[bpaf(command("list"))]
    List,
    /// Save a rule for an address
    #[bpaf(command("set"))]
    Set {
        #[bpaf(positional("ADDRESS"))]
        address: String,
        #[bpaf(positional("TITLE"))]
        title: String,
    },
    /// Remove the rule for an address
    #[bpaf(command("clear"))]
    Clear {
        #[bpaf(positional("ADDRESS"))]
        address: String,
    },
}

#[derive(Debug)]
pub enum CliError {
    Prefs(PrefsError),
    Store(StoreError),
    Rules(RuleStoreError),
    Host(HostError),
    Io(String),
    Unsupported(String),
}

impl From<PrefsError> for CliError {
    fn from(e: PrefsError) -> Self {
        CliError::Prefs(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<RuleStoreError> for CliError {
    fn from(e: RuleStoreError) -> Self {
        CliError::Rules(e)
    }
}

impl From<HostError> for CliError {
    fn from(e: HostError) -> Self {
        CliError::Host(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Prefs(e) => write!(f, "{e}"),
            CliError::Store(e) => write!(f, "{e}"),
            CliError::Rules(e) => write!(f, "{e}"),
            CliError::Host(e) => write!(f, "host error: {e}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
            CliError::Unsupported(address) => {
                write!(f, "This page URL is not supported. ({address})")
            },
        }
    }
}

impl std::error::Error for CliError {}

pub fn main() {
    let opts = options().run();

    let prefs = match opts.config.clone().or_else(default_prefs_path) {
        Some(path) => Preferences::load(&path),
        None => Ok(Preferences::default()),
    };
    let prefs = match prefs {
        Ok(prefs) => prefs.with_overrides(opts.data_dir.clone(), opts.log_filter.clone()),
        Err(e) => {
            eprintln!("retitle: {e}");
            process::exit(2);
        },
    };

    crate::init_tracing(prefs.log_filter.as_deref());

    if let Err(e) = run(opts.command, &prefs) {
        log::warn!("retitle: command failed: {e}");
        eprintln!("retitle: {e}");
        process::exit(1);
    }
}

pub fn run(command: Command, prefs: &Preferences) -> Result<(), CliError> {
    match command {
        Command::Key { address } => {
            match address_key::derive_key(&address) {
                Some(key) => println!("{key}"),
                None => println!("unsupported"),
            }
            Ok(())
        },
        Command::Rules(rules) => {
            let db = RedbDatabase::open(&prefs.resolved_data_dir()?)?;
            run_rules(rules, &RuleStore::new(Arc::new(db.local_area())))
        },
        Command::Serve { tabs } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(tabs, prefs))
        },
    }
}

fn run_rules(command: RulesCommand, rules: &RuleStore) -> Result<(), CliError> {
    match command {
        RulesCommand::List => {
            for (key, title) in rules.list()? {
                println!("{key}\t{title}");
            }
        },
        RulesCommand::Set { address, title } => {
            let key = address_key::derive_key(&address)
                .ok_or_else(|| CliError::Unsupported(address.clone()))?;
            let title = rules.set(&key, &title)?;
            println!("{key}\t{title}");
        },
        RulesCommand::Clear { address } => {
            let key =
                address_key::derive_key(&address).ok_or(CliError::Unsupported(address))?;
            rules.delete(&key)?;
            println!("{key}");
        },
    }
    Ok(())
}

/// Build an orchestrator over the redb database and the headless host.
pub fn build_orchestrator(prefs: &Preferences) -> Result<Orchestrator<HeadlessBrowser>, CliError> {
    let db = RedbDatabase::open(&prefs.resolved_data_dir()?)?;
    let session: Arc<dyn KeyValueStore> = if prefs.session_storage {
        Arc::new(db.session_area())
    } else {
        Arc::new(DisabledStore)
    };
    Ok(Orchestrator::new(
        HeadlessBrowser::new(prefs.reassert_interval()),
        RuleStore::new(Arc::new(db.local_area())),
        LaunchContextBroker::new(session, prefs.launch_context_ttl()),
    ))
}

async fn serve(tabs: Vec<String>, prefs: &Preferences) -> Result<(), CliError> {
    let orchestrator = build_orchestrator(prefs)?;
    orchestrator.start().await;

    for address in &tabs {
        let tab = orchestrator.host().open_tab("about:blank", "");
        let (change, info) =
            orchestrator
                .host()
                .navigate(tab, address, &address_key::host_label(address))?;
        orchestrator.on_tab_updated(tab, &change, &info).await;
        log::info!("serve: opened tab {tab} at {address}");
    }

    let mut stdout = tokio::io::stdout();
    serve_lines(&orchestrator, BufReader::new(tokio::io::stdin()), &mut stdout).await?;
    log::debug!("serve: stdin closed");
    Ok(())
}

/// Answer one JSON request per line until `reader` is exhausted.
///
/// A line that is not valid JSON (including one that is not UTF-8) gets a
/// `Malformed request` reply and the loop carries on.
pub async fn serve_lines<H, R, W>(
    orchestrator: &Orchestrator<H>,
    mut reader: R,
    writer: &mut W,
) -> Result<(), CliError>
where
    H: TabHost,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_slice::<Value>(line) {
            Ok(message) => orchestrator.handle_json(&message).await,
            Err(e) => {
                log::debug!("serve: malformed line: {e}");
                Response::failed(format!("Malformed request: {e}")).to_json()
            },
        };
        let mut out = reply.to_string();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn prefs_in(dir: &TempDir) -> Preferences {
        Preferences::default().with_overrides(Some(dir.path().to_path_buf()), None)
    }

    #[test]
    fn parses_serve_with_repeated_tabs() {
        let opts = options()
            .run_inner(&["--data-dir", "/tmp/r", "serve", "--tab", "https://a.com/", "--tab", "https://b.com/"])
            .unwrap();
        assert_eq!(opts.data_dir, Some(PathBuf::from("/tmp/r")));
        match opts.command {
            Command::Serve { tabs } => assert_eq!(tabs, vec!["https://a.com/", "https://b.com/"]),
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn parses_rules_set() {
        let opts = options()
            .run_inner(&["rules", "set", "https://a.com/x", "Hello"])
            .unwrap();
        match opts.command {
            Command::Rules(RulesCommand::Set { address, title }) => {
                assert_eq!(address, "https://a.com/x");
                assert_eq!(title, "Hello");
            },
            other => panic!("expected rules set, got {other:?}"),
        }
    }

    #[test]
    fn rules_commands_edit_the_database() {
        let dir = TempDir::new().unwrap();
        let prefs = prefs_in(&dir);
        run(
            Command::Rules(RulesCommand::Set {
                address: "https://a.com/x?y=1".to_string(),
                title: "Saved".to_string(),
            }),
            &prefs,
        )
        .unwrap();

        let db = RedbDatabase::open(dir.path()).unwrap();
        let rules = RuleStore::new(Arc::new(db.local_area()));
        let key = address_key::derive_key("https://a.com/x").unwrap();
        assert_eq!(rules.get(&key).unwrap().as_deref(), Some("Saved"));
        drop(rules);
        drop(db);

        let result = run(
            Command::Rules(RulesCommand::Clear {
                address: "chrome://newtab".to_string(),
            }),
            &prefs,
        );
        assert!(matches!(result, Err(CliError::Unsupported(_))));
    }

    #[test]
    fn blank_rule_title_is_reported() {
        let dir = TempDir::new().unwrap();
        let result = run(
            Command::Rules(RulesCommand::Set {
                address: "https://a.com/".to_string(),
                title: " ".to_string(),
            }),
            &prefs_in(&dir),
        );
        assert!(matches!(
            result,
            Err(CliError::Rules(RuleStoreError::EmptyTitle))
        ));
    }

    #[tokio::test]
    async fn serve_answers_every_line_after_a_bad_frame() {
        let dir = TempDir::new().unwrap();
        let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
        let input: &[u8] = b"{\"type\":\"get-tab-state\",\"address\":\"https://a.com/\"}\n\
            \xff\xfe\n\
            \n\
            {\"type\":\"consume-launch-context\"}\n";
        let mut output = Vec::new();
        serve_lines(&orchestrator, input, &mut output).await.unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["ok"], true);
        assert_eq!(replies[1]["ok"], false);
        assert!(
            replies[1]["error"]
                .as_str()
                .unwrap()
                .starts_with("Malformed request")
        );
        assert_eq!(replies[2], serde_json::json!({ "ok": true, "tabId": null }));
    }
}
