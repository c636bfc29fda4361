//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Typed, validated relations between tickets (`SQLite`)
#[derive(Parser, Debug)]
#[command(name = "bhrel", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: .bhrel/relations.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// `SQLite` busy timeout in ms
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a relations workspace in the current directory
    Init {
        /// Reinitialize even if a database exists
        #[arg(long)]
        force: bool,
    },

    /// Manage tickets
    Ticket {
        #[command(subcommand)]
        command: TicketCommands,
    },

    /// Manage relations
    #[command(alias = "relation")]
    Rel {
        #[command(subcommand)]
        command: RelCommands,
    },

    /// List configured relation types
    Types,

    /// List open tickets blocking a resource
    Blockers {
        /// Resource id (product:realm:id)
        resource: String,
    },

    /// Show a resource's history
    History {
        /// Resource id (product:realm:id)
        resource: String,

        /// Maximum number of events (0 = all)
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Inspect and edit configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum TicketCommands {
    /// Create a ticket
    Create(TicketCreateArgs),
    /// Close a ticket (refused while it has open blockers)
    Close(TicketCloseArgs),
    /// Reopen a closed ticket
    Reopen {
        /// Ticket id
        id: String,

        /// Reason for reopening
        #[arg(long, short = 'm')]
        comment: Option<String>,
    },
    /// Delete a ticket and every relation touching it
    Delete {
        /// Ticket id
        id: String,
    },
    /// Show a ticket with its relations
    Show {
        /// Ticket id
        id: String,
    },
    /// List tickets
    List {
        /// Only tickets of this product
        #[arg(long)]
        product: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct TicketCreateArgs {
    /// Ticket summary (copied from the linked ticket when omitted)
    pub summary: Option<String>,

    /// Product the ticket belongs to
    #[arg(long, short = 'p', default_value = "default")]
    pub product: String,

    /// Create the ticket related to this existing ticket
    #[arg(long, requires = "relation")]
    pub linked_to: Option<String>,

    /// Relation type from the new ticket to --linked-to
    #[arg(long, short = 't', requires = "linked_to")]
    pub relation: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct TicketCloseArgs {
    /// Ticket id
    pub id: String,

    /// Close even if open blockers remain
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Resolution comment
    #[arg(long, short = 'm')]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RelCommands {
    /// Add a relation: <source> <type> <destination>
    Add(RelAddArgs),
    /// Check whether a relation would be accepted, without storing it
    Check(RelAddArgs),
    /// Remove a relation by id (`source,destination,type`) or by parts
    Remove(RelRemoveArgs),
    /// List relations touching a resource
    List {
        /// Resource id
        resource: String,
    },
    /// Shortest path between two resources
    Path(RelPathArgs),
    /// Resources that reach this one
    Ancestors(RelReachArgs),
    /// Resources reachable from this one
    Descendants(RelReachArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct RelAddArgs {
    /// Source resource id
    pub source: String,

    /// Relation type
    pub relation_type: String,

    /// Destination resource id
    pub destination: String,

    /// Free-text comment stored on the relation
    #[arg(long, short = 'm', default_value = "")]
    pub comment: String,
}

#[derive(Args, Debug, Default)]
pub struct RelRemoveArgs {
    /// Relation id, or the source when type and destination follow
    pub id_or_source: String,

    /// Relation type
    #[arg(requires = "destination")]
    pub relation_type: Option<String>,

    /// Destination resource id
    #[arg(requires = "relation_type")]
    pub destination: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct RelPathArgs {
    /// Start resource
    pub source: String,

    /// End resource
    pub destination: String,

    /// Relation types to follow (comma-separated; default all)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct RelReachArgs {
    /// Resource id
    pub resource: String,

    /// Relation types to follow (comma-separated; default all)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the merged configuration
    List,
    /// Show one key
    Get {
        key: String,
    },
    /// Store a runtime key in the database
    Set {
        key: String,
        value: String,
    },
    /// Remove a key from the database
    Unset {
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rel_add_with_globals() {
        let cli = Cli::try_parse_from([
            "bhrel", "--json", "rel", "add", "p:ticket:1", "dependson", "p:ticket:2", "-m", "why",
        ])
        .expect("parse");
        assert!(cli.json);
        match cli.command {
            Commands::Rel {
                command: RelCommands::Add(args),
            } => {
                assert_eq!(args.relation_type, "dependson");
                assert_eq!(args.comment, "why");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn linked_ticket_requires_relation() {
        let result = Cli::try_parse_from([
            "bhrel", "ticket", "create", "x", "--linked-to", "p:ticket:1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn path_types_split_on_commas() {
        let cli = Cli::try_parse_from([
            "bhrel", "rel", "path", "a:b:c", "a:b:d", "-t", "parent,children",
        ])
        .expect("parse");
        match cli.command {
            Commands::Rel {
                command: RelCommands::Path(args),
            } => assert_eq!(args.types, vec!["parent", "children"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
