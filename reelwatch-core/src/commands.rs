//! Chat command parsing and handling.
//!
//! Commands arrive as message text (`/recent 5`, `/search@SomeBot matrix`).
//! Parsing yields a closed [`Command`] set; [`CommandRouter`] turns each into
//! a reply message. Nothing here can fail the process: every error becomes
//! a user-facing reply.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::notify::{Block, Composer, NotificationMessage, Span, format_timestamp, imdb_link};
use crate::query::{DEFAULT_RECENT_COUNT, LibraryItem, QueryError, QueryService, StatusReport};
use crate::scheduler::{SchedulerHandle, TriggerOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Search { query: String },
    Recent { count: usize },
    Update,
}

#[derive(Debug, Clone, Copy)]
struct CommandHelp {
    usage: &'static str,
    summary: &'static str,
}

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "/start",
        summary: "Introduction",
    },
    CommandHelp {
        usage: "/help",
        summary: "List available commands",
    },
    CommandHelp {
        usage: "/status",
        summary: "Library totals and scanner state",
    },
    CommandHelp {
        usage: "/search <title>",
        summary: "Find titles in the library",
    },
    CommandHelp {
        usage: "/recent [count]",
        summary: "Most recently added items (default 3)",
    },
    CommandHelp {
        usage: "/update",
        summary: "Scan the library now",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command /{0}. Send /help for the list of commands.")]
    Unknown(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Not a command")]
    NotACommand,

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl Command {
    /// Parse message text. `bot_username`, when known, is used to ignore
    /// commands addressed to a different bot in group chats.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Result<Self, CommandError> {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Err(CommandError::NotACommand);
        };

        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = match head.split_once('@') {
            Some((name, addressee)) => {
                if let Some(ours) = bot_username
                    && !addressee.eq_ignore_ascii_case(ours)
                {
                    return Err(CommandError::NotACommand);
                }
                name
            }
            None => head,
        };
        let name = name.to_ascii_lowercase();
        if name.is_empty() {
            return Err(CommandError::NotACommand);
        }

        match name.as_str() {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "status" => Ok(Self::Status),
            "update" => Ok(Self::Update),
            "search" => {
                if args.is_empty() {
                    return Err(CommandError::InvalidArgument(
                        "Usage: /search <title>".to_string(),
                    ));
                }
                Ok(Self::Search {
                    query: args.to_string(),
                })
            }
            "recent" => Ok(Self::Recent {
                count: parse_count(args)?,
            }),
            _ => Err(CommandError::Unknown(name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Status => "status",
            Self::Search { .. } => "search",
            Self::Recent { .. } => "recent",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search { query } => write!(f, "/search {query}"),
            Self::Recent { count } => write!(f, "/recent {count}"),
            other => write!(f, "/{}", other.name()),
        }
    }
}

fn parse_count(args: &str) -> Result<usize, CommandError> {
    let Some(raw) = args.split_whitespace().next() else {
        return Ok(DEFAULT_RECENT_COUNT);
    };
    match raw.parse::<i64>() {
        Ok(count) if count > 0 => Ok(usize::try_from(count).unwrap_or(usize::MAX)),
        Ok(_) => Err(CommandError::InvalidArgument(
            "Count must be a positive number.".to_string(),
        )),
        Err(_) => Err(CommandError::InvalidArgument(format!(
            "'{raw}' is not a number. Usage: /recent [count]"
        ))),
    }
}

/// Executes commands against the query service and scheduler.
pub struct CommandRouter {
    queries: Arc<QueryService>,
    scheduler: Option<SchedulerHandle>,
    composer: Arc<Composer>,
    bot_username: Option<String>,
}

impl fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRouter")
            .field("scheduler", &self.scheduler)
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    pub fn new(queries: Arc<QueryService>, composer: Arc<Composer>) -> Self {
        Self {
            queries,
            scheduler: None,
            composer,
            bot_username: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Reply to a chat message. `None` for text that is not a command.
    pub async fn handle(&self, text: &str) -> Option<NotificationMessage> {
        let blocks = match Command::parse(text, self.bot_username.as_deref()) {
            Ok(command) => {
                debug!("Handling {}", command);
                match self.execute(&command).await {
                    Ok(blocks) => blocks,
                    Err(e) => vec![error_block(&e)],
                }
            }
            Err(CommandError::NotACommand) => return None,
            Err(e) => vec![error_block(&e)],
        };
        Some(self.composer.compose(blocks))
    }

    pub async fn execute(&self, command: &Command) -> Result<Vec<Block>, CommandError> {
        match command {
            Command::Start => {
                let mut blocks = vec![Block::new(vec![
                    Span::bold("Welcome to Reelwatch!"),
                    Span::text(
                        "\nI post a message whenever titles are added to or removed from your library.",
                    ),
                ])];
                blocks.extend(help_blocks());
                Ok(blocks)
            }
            Command::Help => Ok(help_blocks()),
            Command::Status => Ok(status_blocks(&self.queries.status().await)),
            Command::Search { query } => {
                let items = self.queries.search(query).await?;
                if items.is_empty() {
                    return Ok(vec![Block::new(vec![Span::text(format!(
                        "No matches for \"{}\".",
                        query.trim()
                    ))])]);
                }
                let mut blocks = vec![Block::new(vec![Span::bold(format!(
                    "Search results for \"{}\" ({}):",
                    query.trim(),
                    items.len()
                ))])];
                blocks.extend(items.iter().map(|item| self.item_block(item, false)));
                Ok(blocks)
            }
            Command::Recent { count } => {
                let items = self.queries.recent(*count).await?;
                if items.is_empty() {
                    return Ok(vec![Block::new(vec![Span::text(
                        "Nothing has been added yet.",
                    )])]);
                }
                let mut blocks = vec![Block::new(vec![Span::bold(format!(
                    "{} most recently added:",
                    items.len()
                ))])];
                blocks.extend(items.iter().map(|item| self.item_block(item, true)));
                Ok(blocks)
            }
            Command::Update => Ok(vec![Block::new(vec![Span::text(self.trigger_scan())])]),
        }
    }

    fn trigger_scan(&self) -> String {
        let Some(scheduler) = &self.scheduler else {
            return "Scanning is not available right now.".to_string();
        };
        match scheduler.request_scan() {
            TriggerOutcome::Accepted => {
                info!("Manual scan requested from chat");
                "Scan started. You'll get a message if anything changed.".to_string()
            }
            TriggerOutcome::Rejected(phase) => {
                format!("A scan is already {phase}. Try again once it finishes.")
            }
        }
    }

    fn item_block(&self, item: &LibraryItem, with_added: bool) -> Block {
        let mut spans = vec![Span::text("  - "), Span::bold(item.display_title())];
        if let Some(year) = item.display_year() {
            spans.push(Span::text(format!(" ({year})")));
        }
        if with_added {
            spans.push(Span::text(format!(
                "\n    Added {} in {}",
                format_timestamp(item.entry.first_seen),
                item.entry.path.label()
            )));
        } else {
            spans.push(Span::text(format!("\n    In {}", item.entry.path.label())));
        }
        if let Some(record) = item.metadata.as_ref().filter(|record| record.is_resolved()) {
            if let Some(genre) = &record.genre {
                spans.push(Span::text(format!("\n    Genre: {genre}")));
            }
            if let Some(plot) = &record.plot {
                spans.push(Span::text(format!(
                    "\n    Plot: {}",
                    self.composer.plot_preview(plot)
                )));
            }
            if let Some(id) = &record.external_id {
                spans.push(Span::text("\n    "));
                spans.push(imdb_link(id));
            }
        }
        Block::new(spans)
    }
}

fn help_blocks() -> Vec<Block> {
    let mut blocks = vec![Block::new(vec![Span::bold("Commands:")]).with_gap()];
    blocks.extend(COMMANDS.iter().map(|help| {
        Block::new(vec![Span::text(format!("{} - {}", help.usage, help.summary))])
    }));
    blocks
}

fn status_blocks(status: &StatusReport) -> Vec<Block> {
    let stamp = |at: Option<chrono::DateTime<chrono::Utc>>| {
        at.map_or_else(|| "never".to_string(), format_timestamp)
    };

    let mut blocks = vec![
        Block::new(vec![Span::bold("Library Status")]),
        Block::new(vec![Span::text(format!("Last scan: {}", stamp(status.last_scan)))]),
        Block::new(vec![Span::text(format!(
            "Total unique items: {}",
            status.total_unique
        ))]),
    ];
    for (path, count) in &status.per_path {
        blocks.push(Block::new(vec![
            Span::text("  "),
            Span::bold(path.label()),
            Span::text(format!(": {count} folders")),
        ]));
    }
    if let Some(phase) = status.phase {
        blocks.push(Block::new(vec![Span::text(format!("Scanner: {phase}"))]).with_gap());
    }
    blocks.push(Block::new(vec![Span::text(format!(
        "Last heartbeat: {}",
        stamp(status.last_heartbeat)
    ))]));
    blocks
}

fn error_block(error: &CommandError) -> Block {
    Block::new(vec![Span::text(error.to_string())])
}
