//! Relation commands

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::json;
use tangle_core::{NewRelationship, RelationshipId};

use super::{entity_label, parse_metadata, resolve_entity};
use crate::output::{relationship_line, to_json};
use crate::AppContext;

#[derive(Args)]
pub struct RelationArgs {
    #[command(subcommand)]
    pub command: RelationCommands,
}

#[derive(Subcommand)]
pub enum RelationCommands {
    /// Add a relationship between two entities
    Add {
        /// Source entity name or ID
        from: String,
        /// Target entity name or ID
        to: String,
        /// Relationship type
        #[arg(short = 't', long)]
        r#type: String,
        /// Metadata as KEY=VALUE (repeatable)
        #[arg(short, long)]
        meta: Vec<String>,
        /// Start of the validity period (RFC 3339)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// End of the validity period (RFC 3339)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// List relationships of an entity
    List {
        /// Entity name or ID
        entity: String,
        /// Filter by relationship type
        #[arg(short = 't', long)]
        r#type: Option<String>,
        /// Show incoming instead of outgoing relationships
        #[arg(short, long)]
        incoming: bool,
    },
    /// Delete a relationship and its inverse
    Delete {
        /// Relationship ID
        id: String,
        /// Remove permanently instead of soft-deleting
        #[arg(long)]
        force: bool,
    },
    /// Walk outgoing relationships depth-first
    Traverse {
        /// Start entity name or ID
        start: String,
        /// Relationship types to follow (comma separated)
        #[arg(short = 't', long = "type", value_delimiter = ',', required = true)]
        types: Vec<String>,
        /// Maximum number of hops
        #[arg(long, default_value = "3")]
        depth: u32,
    },
}

pub async fn run(args: &RelationArgs, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        RelationCommands::Add {
            from,
            to,
            r#type,
            meta,
            start,
            end,
        } => {
            let from = resolve_entity(ctx, from).await?;
            let to = resolve_entity(ctx, to).await?;

            let mut new = NewRelationship::new(r#type);
            new.metadata = parse_metadata(meta)?;
            if let Some(at) = start {
                new = new.starting_at(*at);
            }
            if let Some(at) = end {
                new = new.ending_at(*at);
            }

            let relationship = ctx.manager.create(&from, &to, new).await?;
            tracing::info!("Created relation: {} -[{}]-> {}", from.name, r#type, to.name);

            if ctx.format.is_json() {
                println!("{}", to_json(&relationship)?);
            } else {
                println!(
                    "Created relation: {}",
                    relationship_line(&relationship, &from.name, &to.name)
                );
            }
        }
        RelationCommands::List {
            entity,
            r#type,
            incoming,
        } => {
            let entity = resolve_entity(ctx, entity).await?;
            let relationships = ctx
                .manager
                .get_relationships(&entity.id, r#type.as_deref(), *incoming)
                .await?;

            if ctx.format.is_json() {
                println!("{}", to_json(&relationships)?);
            } else if relationships.is_empty() {
                println!("No relations found for '{}'", entity.name);
            } else {
                println!("Relations of '{}' ({} found):", entity.name, relationships.len());
                for relationship in &relationships {
                    let from = entity_label(ctx, &relationship.from_id).await;
                    let to = entity_label(ctx, &relationship.to_id).await;
                    println!("  {}", relationship_line(relationship, &from, &to));
                }
            }
        }
        RelationCommands::Delete { id, force } => {
            let id = RelationshipId::from_string(id)
                .map_err(|e| anyhow::anyhow!("Invalid relationship ID '{}': {}", id, e))?;
            ctx.manager.delete_relationship(&id, *force).await?;

            if *force {
                println!("Permanently deleted relation: {}", id);
            } else {
                println!("Deleted relation: {}", id);
            }
        }
        RelationCommands::Traverse {
            start,
            types,
            depth,
        } => {
            let start = resolve_entity(ctx, start).await?;
            let result = ctx.manager.traverse(&start.id, types, *depth).await?;

            let mut names = Vec::with_capacity(result.len());
            for id in &result.visited {
                names.push(entity_label(ctx, id).await);
            }

            if ctx.format.is_json() {
                println!(
                    "{}",
                    to_json(&json!({
                        "start": result.start,
                        "visited": result.visited,
                        "names": names,
                        "stats": result.stats,
                    }))?
                );
                return Ok(());
            }

            println!(
                "Reached {} entities from '{}' (max depth {}):",
                result.len(),
                start.name,
                result.stats.max_depth_reached
            );
            for (id, name) in result.visited.iter().zip(&names) {
                println!("  {} ({})", name, id);
            }
        }
    }

    Ok(())
}
