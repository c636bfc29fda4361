//! Relation commands.

use super::{Workspace, parse_resource};
use crate::api::NewRelation;
use crate::cli::{RelAddArgs, RelCommands, RelPathArgs, RelReachArgs, RelRemoveArgs};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::model::{Relation, RelationId};
use crate::output::OutputContext;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Serialize)]
struct RelationActionResult<'a> {
    action: &'static str,
    relation_id: RelationId,
    #[serde(flatten)]
    relation: &'a Relation,
}

#[derive(Serialize)]
struct ReachResult<'a> {
    resource: &'a str,
    direction: &'static str,
    types: &'a [String],
    resources: &'a BTreeSet<String>,
}

/// Execute a rel subcommand.
///
/// # Errors
///
/// Returns an error if an id is malformed, the type is unknown, validation
/// fails, or a database operation fails.
pub fn execute(command: &RelCommands, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let mut ws = Workspace::open(cli)?;

    match command {
        RelCommands::Add(args) => add(&mut ws, args, ctx),
        RelCommands::Check(args) => check(&ws, args, ctx),
        RelCommands::Remove(args) => remove(&mut ws, args, ctx),
        RelCommands::List { resource } => list(&ws, resource, ctx),
        RelCommands::Path(args) => path(&ws, args, ctx),
        RelCommands::Ancestors(args) => reach(&ws, args, false, ctx),
        RelCommands::Descendants(args) => reach(&ws, args, true, ctx),
    }
}

fn new_relation(ws: &Workspace, args: &RelAddArgs) -> Result<NewRelation> {
    Ok(
        NewRelation::parse(&args.source, &args.relation_type, &args.destination)?
            .with_comment(args.comment.clone())
            .with_author(ws.actor.clone()),
    )
}

fn add(ws: &mut Workspace, args: &RelAddArgs, ctx: &OutputContext) -> Result<()> {
    let new = new_relation(ws, args)?;
    let relation = ws.system.add_relation(&mut ws.storage, new)?;

    if ctx.is_json() {
        return ctx.json_pretty(&RelationActionResult {
            action: "added",
            relation_id: relation.id(),
            relation: &relation,
        });
    }
    ctx.success(&format!(
        "{} {} {}",
        relation.source,
        ws.system.registry().label_of(&relation.relation_type),
        relation.destination
    ));
    Ok(())
}

fn check(ws: &Workspace, args: &RelAddArgs, ctx: &OutputContext) -> Result<()> {
    let relation = new_relation(ws, args)?.into_relation();
    ws.system.validate(ws.storage.conn(), &relation)?;

    if ctx.is_json() {
        return ctx.json_pretty(&serde_json::json!({
            "valid": true,
            "relation_id": relation.id(),
        }));
    }
    ctx.success(&format!("{} would be accepted", relation.id()));
    Ok(())
}

fn remove(ws: &mut Workspace, args: &RelRemoveArgs, ctx: &OutputContext) -> Result<()> {
    let id = match (&args.relation_type, &args.destination) {
        (Some(relation_type), Some(destination)) => RelationId {
            source: parse_resource(&args.id_or_source)?,
            destination: parse_resource(destination)?,
            relation_type: relation_type.clone(),
        },
        _ => RelationId::parse(args.id_or_source.trim())?,
    };
    let relation = ws.system.delete_relation(&mut ws.storage, &id, &ws.actor)?;

    if ctx.is_json() {
        return ctx.json_pretty(&RelationActionResult {
            action: "removed",
            relation_id: id,
            relation: &relation,
        });
    }
    ctx.success(&format!("Removed {id}"));
    Ok(())
}

fn list(ws: &Workspace, resource: &str, ctx: &OutputContext) -> Result<()> {
    let resource = parse_resource(resource)?;
    let views = ws.system.get_relations(&ws.storage, &resource)?;

    if ctx.is_json() {
        return ctx.json_pretty(&views);
    }
    if views.is_empty() {
        ctx.print(&format!("No relations for {resource}"));
        return Ok(());
    }
    for view in &views {
        let relation = &view.relation;
        let comment = if relation.comment.is_empty() {
            String::new()
        } else {
            format!(" {}", ctx.dim(&format!("({})", relation.comment)))
        };
        ctx.print(&format!(
            "{} {} {}{comment}",
            relation.source,
            ctx.bold(&view.label),
            relation.destination
        ));
    }
    Ok(())
}

fn path(ws: &Workspace, args: &RelPathArgs, ctx: &OutputContext) -> Result<()> {
    let source = parse_resource(&args.source)?;
    let destination = parse_resource(&args.destination)?;
    let types = ws.types_or_all(&args.types)?;
    let found = ws.system.find_path(&ws.storage, &source, &destination, &types)?;

    if ctx.is_json() {
        return ctx.json_pretty(&serde_json::json!({
            "source": source,
            "destination": destination,
            "path": found,
        }));
    }
    match found {
        Some(path) => ctx.print(&path.join(" -> ")),
        None => ctx.print(&format!("No path from {source} to {destination}")),
    }
    Ok(())
}

fn reach(ws: &Workspace, args: &RelReachArgs, descendants: bool, ctx: &OutputContext) -> Result<()> {
    let resource = parse_resource(&args.resource)?;
    let types = ws.types_or_all(&args.types)?;
    let resources = if descendants {
        ws.system.descendants(&ws.storage, &resource, &types)?
    } else {
        ws.system.ancestors(&ws.storage, &resource, &types)?
    };

    if ctx.is_json() {
        return ctx.json_pretty(&ReachResult {
            resource: resource.as_str(),
            direction: if descendants { "descendants" } else { "ancestors" },
            types: &types,
            resources: &resources,
        });
    }
    for id in &resources {
        ctx.print(id);
    }
    Ok(())
}
