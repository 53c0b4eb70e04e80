#![forbid(unsafe_code)]

mod settings;

use anyhow::Context;
use checktree_core::{
    ChecktreeError, CopyRequest, NewNode, NodePatch, NodeType, PurgeStrategy, Status, TagAction,
    TagOp, TagOpKind, TagOpRequest, Workspace,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "checktree: checklist trees with inherited status and tags",
    long_about = None
)]
struct Cli {
    /// Database file; created with a seed root when it does not exist.
    #[arg(long, global = true, env = "CHECKTREE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(next_help_heading = "Read", about = "Show one node")]
    Show { id: i64 },

    #[command(
        next_help_heading = "Read",
        about = "Show a node and all its descendants",
        after_help = "EXAMPLES:\n    checktree tree 1"
    )]
    Tree { id: i64 },

    #[command(next_help_heading = "Read", about = "List direct children (roots when no parent)")]
    Children {
        #[arg(long)]
        parent: Option<i64>,
    },

    #[command(next_help_heading = "Read", about = "Show effective status and tags")]
    Effective { id: i64 },

    #[command(next_help_heading = "Read", about = "Count childless WHEN nodes in a subtree")]
    Counts { id: i64 },

    #[command(
        next_help_heading = "Write",
        about = "Create a node",
        after_help = "EXAMPLES:\n    checktree create --parent 1 --type WHEN_GROUP --title Login\n    checktree create --parent 2 --type WHEN --title Valid --status \"in progress\""
    )]
    Create(CreateArgs),

    #[command(
        next_help_heading = "Write",
        about = "Patch a node's own fields",
        after_help = "EXAMPLES:\n    checktree patch 4 --title \"Invalid password\" --version 1\n    checktree patch 4 --inherit-status"
    )]
    Patch(PatchArgs),

    #[command(next_help_heading = "Write", about = "Delete a node and its subtree")]
    Delete { id: i64 },

    #[command(next_help_heading = "Write", about = "Manage local tag-ops")]
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },

    #[command(
        next_help_heading = "Write",
        about = "Copy or merge a subtree into a destination",
        after_help = "EXAMPLES:\n    checktree copy 2 --to 7\n    checktree copy 2 --to 7 --after 9"
    )]
    Copy {
        source: i64,
        /// Destination parent; omitted copies into the root scope.
        #[arg(long = "to")]
        target_parent: Option<i64>,
        /// Existing child of the destination to place the copy after.
        #[arg(long = "after")]
        sibling_of: Option<i64>,
    },

    #[command(next_help_heading = "Write", about = "Reset sibling sort keys to 0, 1, 2, ...")]
    Renumber {
        #[arg(long)]
        parent: Option<i64>,
    },

    #[command(next_help_heading = "Read", about = "List logged operations, newest first")]
    Log {
        #[arg(long = "type")]
        type_filter: Option<String>,
        /// Only operations at or after this Unix timestamp.
        #[arg(long)]
        since: Option<i64>,
        /// Only operations at or before this Unix timestamp.
        #[arg(long)]
        until: Option<i64>,
        /// Delete every logged operation instead of listing.
        #[arg(long, conflicts_with_all = ["type_filter", "since", "until"])]
        purge: bool,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    parent: Option<i64>,
    /// GIVEN, WHEN_GROUP or WHEN.
    #[arg(long = "type")]
    node_type: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    note: Option<String>,
    /// "to do", "in progress", "done" or "cancelled"; omitted inherits.
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    sort: Option<f64>,
}

#[derive(Args, Debug)]
struct PatchArgs {
    id: i64,
    #[arg(long)]
    title: Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    description: Option<String>,
    #[arg(long)]
    clear_description: bool,
    #[arg(long, conflicts_with = "clear_note")]
    note: Option<String>,
    #[arg(long)]
    clear_note: bool,
    #[arg(long, conflicts_with = "inherit_status")]
    status: Option<String>,
    /// Clear the explicit status so the node inherits again.
    #[arg(long)]
    inherit_status: bool,
    #[arg(long, conflicts_with = "to_root")]
    parent: Option<i64>,
    /// Move the node to the root scope.
    #[arg(long)]
    to_root: bool,
    #[arg(long)]
    sort: Option<f64>,
    /// Expected current version; a mismatch rejects the patch.
    #[arg(long)]
    version: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum TagsCommand {
    /// List a node's local tag-ops.
    List { id: i64 },
    /// Replace all local tag-ops of a node.
    Set {
        id: i64,
        #[arg(long = "add")]
        adds: Vec<String>,
        #[arg(long = "remove")]
        removes: Vec<String>,
    },
    /// Insert one tag-op (default op: add).
    Add {
        id: i64,
        tag: String,
        #[arg(long, default_value = "add")]
        op: String,
    },
    /// Delete one tag-op (default op: add).
    Rm {
        id: i64,
        tag: String,
        #[arg(long, default_value = "add")]
        op: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHECKTREE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => report(&e.into()),
        },
        Err(err) => report(&err),
    }
}

fn run(cli: Cli) -> anyhow::Result<Value> {
    let settings = settings::load_settings();
    let path = cli
        .db
        .unwrap_or_else(|| PathBuf::from(&settings.database_path));
    let mut ws = open_workspace(&path)?;
    ws.set_purge_strategy(PurgeStrategy::KeepLast {
        keep_last: settings.operation_log_keep_last,
    });

    match cli.command {
        Commands::Show { id } => to_json(ws.get_node(id)?),
        Commands::Tree { id } => to_json(ws.get_subtree(id)?),
        Commands::Children { parent } => to_json(ws.get_children(parent)?),
        Commands::Effective { id } => to_json(ws.get_effective(id)?),
        Commands::Counts { id } => Ok(json!({ "id": id, "leaf_when_count": ws.leaf_when_count(id)? })),
        Commands::Create(args) => {
            let new = NewNode {
                parent_id: args.parent,
                node_type: args.node_type.parse::<NodeType>()?,
                title: args.title,
                description: args.description,
                note: args.note,
                explicit_status: args.status.as_deref().map(str::parse::<Status>).transpose()?,
                sort: args.sort,
            };
            to_json(ws.create_node(new)?)
        }
        Commands::Patch(args) => {
            let id = args.id;
            to_json(ws.update_node(id, patch_from_args(args)?)?)
        }
        Commands::Delete { id } => to_json(ws.delete_node(id)?),
        Commands::Tags { command } => run_tags(&mut ws, command),
        Commands::Copy { source, target_parent, sibling_of } => to_json(ws.copy_subtree(CopyRequest {
            source_id: source,
            target_parent_id: target_parent,
            sibling_of,
        })?),
        Commands::Renumber { parent } => {
            Ok(json!({ "parent_id": parent, "renumbered": ws.renumber_children(parent)? }))
        }
        Commands::Log { type_filter, since, until, purge } => {
            if purge {
                return Ok(json!({ "purged": ws.purge_all_operations()? }));
            }
            to_json(ws.list_operations(type_filter.as_deref(), since, until)?)
        }
    }
}

fn run_tags(ws: &mut Workspace, command: TagsCommand) -> anyhow::Result<Value> {
    match command {
        TagsCommand::List { id } => to_json(ws.get_tag_ops(id)?),
        TagsCommand::Set { id, adds, removes } => {
            let ops = adds
                .into_iter()
                .map(TagOp::add)
                .chain(removes.into_iter().map(TagOp::remove))
                .collect();
            to_json(ws.replace_tag_ops(id, ops)?)
        }
        TagsCommand::Add { id, tag, op } => to_json(ws.apply_tag_op(
            id,
            TagOpRequest { tag, op: op.parse::<TagOpKind>()?, action: TagAction::Add },
        )?),
        TagsCommand::Rm { id, tag, op } => to_json(ws.apply_tag_op(
            id,
            TagOpRequest { tag, op: op.parse::<TagOpKind>()?, action: TagAction::Delete },
        )?),
    }
}

fn patch_from_args(args: PatchArgs) -> anyhow::Result<NodePatch> {
    let explicit_status = if args.inherit_status {
        Some(None)
    } else {
        args.status.as_deref().map(str::parse::<Status>).transpose()?.map(Some)
    };
    Ok(NodePatch {
        title: args.title,
        description: clearable(args.description, args.clear_description),
        note: clearable(args.note, args.clear_note),
        explicit_status,
        parent_id: clearable(args.parent, args.to_root),
        sort: args.sort,
        version: args.version,
    })
}

/// `--x VALUE` sets, `--clear-x` nulls, neither leaves the field untouched.
fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn open_workspace(path: &Path) -> anyhow::Result<Workspace> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "opening database");
        return Workspace::open(path).with_context(|| format!("opening {}", path.display()));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
    }
    tracing::info!(path = %path.display(), "creating database");
    Workspace::create(path).with_context(|| format!("creating {}", path.display()))
}

fn to_json<T: Serialize>(value: T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Prints `{"error", "message", "current"?}` on stderr and picks the exit code.
fn report(err: &anyhow::Error) -> ExitCode {
    let core = err.downcast_ref::<ChecktreeError>();
    let kind = core.map_or("internal", ChecktreeError::kind);
    let message = core.map_or_else(|| format!("{err:#}"), ChecktreeError::user_message);

    let mut body = json!({ "error": kind, "message": message });
    if let Some(current) = core.and_then(ChecktreeError::current_version) {
        body["current"] = json!(current);
    }
    eprintln!("{body}");

    ExitCode::from(match kind {
        "not_found" => 2,
        "validation" => 3,
        "conflict" => 4,
        _ => 1,
    })
}
