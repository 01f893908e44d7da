use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use wa_chat_digest::app::{App, Request, Response, init_tracing};
use wa_chat_digest::config::load_config_or_default;
use wa_chat_digest::history::JsonFileStore;
use wa_chat_digest::message::{CustomRange, ExtractionResult, SummaryOptions, TimeRange};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_LAST_MESSAGES: usize = 50;
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];
const NO_MESSAGES_HINT: &str =
    "No messages found. Please try a different time range or scroll to load more messages.";

#[derive(Debug, Parser)]
#[command(name = "wa-chat-digest", version, about = "Summarize a saved WhatsApp Web chat")]
struct Cli {
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the extracted and filtered messages as JSON.
    Extract(SelectionArgs),
    /// Extract, filter and summarize a saved chat page.
    Summarize(SelectionArgs),
    /// Store the Gemini API key.
    SetKey { api_key: String },
    /// Report whether a Gemini API key is stored.
    CheckKey,
    /// Show previously generated summaries, newest first.
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Args)]
struct SelectionArgs {
    /// Saved HTML snapshot of the chat page.
    #[arg(long)]
    html: PathBuf,
    /// Keep only the last N messages; 0 keeps all of them.
    #[arg(long, default_value_t = DEFAULT_LAST_MESSAGES)]
    last: usize,
    #[arg(long, value_enum, default_value_t = RangeArg::LastHour)]
    range: RangeArg,
    /// Keep messages sent at or after this local time, e.g. "2026-10-16 09:00".
    /// Combine with `--range all` to select by these bounds alone.
    #[arg(long, value_parser = parse_local_datetime)]
    from: Option<NaiveDateTime>,
    /// Keep messages sent at or before this local time.
    #[arg(long, value_parser = parse_local_datetime)]
    to: Option<NaiveDateTime>,
}

fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| format!("expected a local time like \"2026-10-16 09:00\", got {raw:?}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RangeArg {
    LastHour,
    LastDay,
    LastWeek,
    All,
}

impl SelectionArgs {
    fn options(&self) -> Result<SummaryOptions> {
        let time_range = match self.range {
            RangeArg::LastHour => Some(TimeRange::LastHour),
            RangeArg::LastDay => Some(TimeRange::LastDay),
            RangeArg::LastWeek => Some(TimeRange::LastWeek),
            RangeArg::All => None,
        };
        let custom_range = match (self.from, self.to) {
            (None, None) => None,
            (start, end) => {
                let start = start.unwrap_or(NaiveDateTime::MIN);
                let end = end.unwrap_or(NaiveDateTime::MAX);
                if start > end {
                    bail!("--from must not be later than --to");
                }
                Some(CustomRange { start, end })
            }
        };
        Ok(SummaryOptions {
            last_n_messages: Some(self.last),
            time_range,
            custom_range,
        })
    }

    fn read_html(&self) -> Result<String> {
        std::fs::read_to_string(&self.html)
            .with_context(|| format!("failed to read chat snapshot: {}", self.html.display()))
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config_or_default(&cli.config)?;
    let store = JsonFileStore::new(config.storage.path.clone());
    info!(
        config_path = %cli.config.display(),
        store_path = %store.path().display(),
        "wa-chat-digest started"
    );
    let mut app = App::load(config, store).await?;

    match cli.command {
        Command::Extract(selection) => {
            let extraction = extract(&mut app, &selection).await?;
            let rendered = serde_json::to_string_pretty(&extraction)
                .context("failed to render extraction result")?;
            println!("{rendered}");
        }
        Command::Summarize(selection) => {
            let extraction = extract(&mut app, &selection).await?;
            if extraction.messages.is_empty() {
                bail!(NO_MESSAGES_HINT);
            }
            let response = expect_success(
                app.handle(Request::SummarizeChat {
                    messages: extraction.messages,
                })
                .await,
            )?;
            println!("# {}", extraction.chat_title);
            println!();
            println!("{}", response.summary.unwrap_or_default());
        }
        Command::SetKey { api_key } => {
            expect_success(app.handle(Request::SetApiKey { api_key }).await)?;
            println!("API key saved.");
        }
        Command::CheckKey => {
            let response = expect_success(app.handle(Request::CheckApiKey).await)?;
            if response.has_key.unwrap_or(false) {
                println!("API key is configured.");
            } else {
                println!("API key is not configured.");
            }
        }
        Command::History { limit } => {
            let response = expect_success(app.handle(Request::GetHistory).await)?;
            let history = response.history.unwrap_or_default();
            let shown = limit.unwrap_or(history.len());
            for record in history.iter().take(shown) {
                println!(
                    "{} ({} messages)\n{}\n",
                    record.timestamp, record.message_count, record.summary
                );
            }
        }
    }

    Ok(())
}

async fn extract(app: &mut App<JsonFileStore>, selection: &SelectionArgs) -> Result<ExtractionResult> {
    let html = selection.read_html()?;
    let options = selection.options()?;
    let response = expect_success(
        app.handle(Request::ExtractMessages { html, options })
        .await,
    )?;

    Ok(ExtractionResult {
        messages: response.messages.unwrap_or_default(),
        chat_title: response.chat_title.unwrap_or_default(),
    })
}

fn expect_success(response: Response) -> Result<Response> {
    if response.success {
        Ok(response)
    } else {
        bail!(
            "{}",
            response
                .error
                .unwrap_or_else(|| "request failed".to_owned())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, RangeArg};
    use chrono::NaiveDate;
    use clap::Parser;
    use wa_chat_digest::message::TimeRange;

    #[test]
    fn summarize_defaults_match_popup_defaults() {
        let cli = Cli::parse_from(["wa-chat-digest", "summarize", "--html", "chat.html"]);
        let Command::Summarize(selection) = cli.command else {
            panic!("expected summarize command");
        };
        assert_eq!(selection.range, RangeArg::LastHour);
        let options = selection.options().expect("options");
        assert_eq!(options.last_n_messages, Some(50));
        assert_eq!(options.custom_range, None);
        assert_eq!(options.time_range, Some(TimeRange::LastHour));
        assert_eq!(cli.config.to_str(), Some("config.toml"));
    }

    #[test]
    fn range_all_disables_time_filter() {
        let cli = Cli::parse_from([
            "wa-chat-digest",
            "extract",
            "--html",
            "chat.html",
            "--range",
            "all",
            "--last",
            "0",
        ]);
        let Command::Extract(selection) = cli.command else {
            panic!("expected extract command");
        };
        let options = selection.options().expect("options");
        assert_eq!(options.time_range, None);
        assert_eq!(options.message_limit(), None);
    }

    #[test]
    fn from_and_to_build_custom_range() {
        let cli = Cli::parse_from([
            "wa-chat-digest",
            "summarize",
            "--html",
            "chat.html",
            "--range",
            "all",
            "--from",
            "2026-10-16 09:00",
            "--to",
            "2026-10-16T17:30",
        ]);
        let Command::Summarize(selection) = cli.command else {
            panic!("expected summarize command");
        };
        let range = selection
            .options()
            .expect("options")
            .custom_range
            .expect("custom range");
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).expect("date");
        assert_eq!(range.start, day.and_hms_opt(9, 0, 0).expect("start"));
        assert_eq!(range.end, day.and_hms_opt(17, 30, 0).expect("end"));
    }

    #[test]
    fn open_ended_from_keeps_everything_after_it() {
        let cli = Cli::parse_from([
            "wa-chat-digest",
            "extract",
            "--html",
            "chat.html",
            "--from",
            "2026-10-16 09:00",
        ]);
        let Command::Extract(selection) = cli.command else {
            panic!("expected extract command");
        };
        let range = selection
            .options()
            .expect("options")
            .custom_range
            .expect("custom range");
        let late = NaiveDate::from_ymd_opt(2030, 1, 1)
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .expect("late instant");
        assert!(range.contains(late));
    }

    #[test]
    fn reversed_bounds_are_rejected() {
        let cli = Cli::parse_from([
            "wa-chat-digest",
            "extract",
            "--html",
            "chat.html",
            "--from",
            "2026-10-16 18:00",
            "--to",
            "2026-10-16 09:00",
        ]);
        let Command::Extract(selection) = cli.command else {
            panic!("expected extract command");
        };
        assert!(selection.options().is_err());
    }

    #[test]
    fn malformed_datetime_is_a_usage_error() {
        let result = Cli::try_parse_from([
            "wa-chat-digest",
            "extract",
            "--html",
            "chat.html",
            "--from",
            "yesterday",
        ]);
        assert!(result.is_err());
    }
}
