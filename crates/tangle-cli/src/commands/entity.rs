//! Entity commands

use clap::{Args, Subcommand};
use serde_json::json;
use tangle_core::{EntityQuery, NewEntity, NewObservation};

use super::{parse_metadata, parse_value, resolve_any_entity, resolve_entity};
use crate::output::{entity_line, observation_line, to_json};
use crate::AppContext;

#[derive(Args)]
pub struct EntityArgs {
    #[command(subcommand)]
    pub command: EntityCommands,
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Add a new entity
    Add {
        /// Entity name
        name: String,
        /// Entity type
        #[arg(short = 't', long)]
        r#type: String,
        /// Metadata as KEY=VALUE (repeatable)
        #[arg(short, long)]
        meta: Vec<String>,
    },
    /// List entities
    List {
        /// Filter by type
        #[arg(short = 't', long)]
        r#type: Option<String>,
        /// Filter by name fragment
        #[arg(short, long)]
        name: Option<String>,
        /// Filter by metadata PATH=VALUE (repeatable)
        #[arg(short, long)]
        meta: Vec<String>,
        /// Include deleted entities
        #[arg(long)]
        deleted: bool,
        /// Limit results
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Get entity details
    Get {
        /// Entity name or ID
        entity: String,
        /// Only show observations with at least this confidence
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Only show observations with at most this confidence
        #[arg(long)]
        max_confidence: Option<f64>,
    },
    /// Update an existing entity
    Update {
        /// Entity name or ID
        entity: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// Metadata to merge as KEY=VALUE (repeatable)
        #[arg(short, long)]
        meta: Vec<String>,
    },
    /// Delete an entity along with its observations and relationships
    Delete {
        /// Entity name or ID
        entity: String,
        /// Remove permanently instead of soft-deleting
        #[arg(long)]
        force: bool,
    },
    /// Restore a soft-deleted entity
    Restore {
        /// Entity name or ID
        entity: String,
    },
    /// Add observation to entity
    Observe {
        /// Entity name or ID
        entity: String,
        /// Observation content
        content: String,
        /// Where the observation came from
        #[arg(short, long)]
        source: Option<String>,
        /// Confidence between 0 and 1
        #[arg(short, long)]
        confidence: Option<f64>,
        /// Metadata as KEY=VALUE (repeatable)
        #[arg(short, long)]
        meta: Vec<String>,
    },
    /// Show related entities
    Related {
        /// Entity name or ID
        entity: String,
        /// Follow outgoing edges of this type one hop; defaults to the contains tree
        #[arg(short = 't', long)]
        r#type: Option<String>,
        /// Depth limit for the contains tree
        #[arg(long)]
        depth: Option<u32>,
    },
}

pub async fn run(args: &EntityArgs, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        EntityCommands::Add { name, r#type, meta } => {
            let mut new = NewEntity::new(name, r#type);
            if let Some(metadata) = parse_metadata(meta)? {
                new = new.with_metadata(metadata);
            }

            let entity = ctx.service.create_entity(new).await?;
            tracing::info!("Created entity: {} (type: {})", name, r#type);

            if ctx.format.is_json() {
                println!("{}", to_json(&entity)?);
            } else {
                println!("Created entity: {} (type: {})", entity.name, entity.entity_type);
                println!("  ID: {}", entity.id);
            }
        }
        EntityCommands::List {
            r#type,
            name,
            meta,
            deleted,
            limit,
        } => {
            let mut query = EntityQuery::new();
            if let Some(t) = r#type {
                query = query.of_type(t);
            }
            if let Some(fragment) = name {
                query = query.name_like(fragment);
            }
            for pair in meta {
                let (path, raw) = pair.split_once('=').ok_or_else(|| {
                    anyhow::anyhow!("Invalid metadata filter '{}': expected PATH=VALUE", pair)
                })?;
                query = query.with_metadata(path, parse_value(raw));
            }
            if *deleted {
                query = query.with_deleted();
            }

            let entities: Vec<_> = ctx
                .service
                .find_entities(&query)
                .await?
                .into_iter()
                .take(*limit)
                .collect();
            tracing::info!("Found {} entities", entities.len());

            if ctx.format.is_json() {
                println!("{}", to_json(&entities)?);
            } else if entities.is_empty() {
                println!("No entities found");
            } else {
                println!("Entities ({} found):", entities.len());
                for entity in &entities {
                    println!("  {}", entity_line(entity));
                }
            }
        }
        EntityCommands::Get {
            entity,
            min_confidence,
            max_confidence,
        } => {
            let entity = resolve_entity(ctx, entity).await?;
            let observations = if min_confidence.is_some() || max_confidence.is_some() {
                ctx.service
                    .observations_with_confidence(
                        &entity.id,
                        min_confidence.unwrap_or(0.0),
                        max_confidence.unwrap_or(1.0),
                    )
                    .await?
            } else {
                ctx.service.observations(&entity.id).await?
            };

            if ctx.format.is_json() {
                println!(
                    "{}",
                    to_json(&json!({ "entity": entity, "observations": observations }))?
                );
                return Ok(());
            }

            println!("Entity: {}", entity.name);
            println!("  ID: {}", entity.id);
            println!("  Type: {}", entity.entity_type);
            println!("  Created: {}", entity.created_at);
            println!("  Updated: {}", entity.updated_at);
            if let Some(metadata) = &entity.metadata {
                let mut keys: Vec<_> = metadata.keys().collect();
                keys.sort();
                println!("  Metadata:");
                for key in keys {
                    println!("    {}: {}", key, metadata[key]);
                }
            }
            if !observations.is_empty() {
                println!("  Observations:");
                for observation in &observations {
                    println!("    {}", observation_line(observation));
                }
            }
        }
        EntityCommands::Update { entity, name, meta } => {
            let mut entity = resolve_entity(ctx, entity).await?;
            let metadata = parse_metadata(meta)?;
            if name.is_none() && metadata.is_none() {
                anyhow::bail!("Nothing to update: pass --name or --meta");
            }

            if let Some(name) = name {
                entity = ctx.service.rename(&entity.id, name).await?;
            }
            if let Some(metadata) = metadata {
                entity = ctx.service.update_metadata(&entity.id, metadata).await?;
            }

            if ctx.format.is_json() {
                println!("{}", to_json(&entity)?);
            } else {
                println!("Updated entity: {}", entity_line(&entity));
            }
        }
        EntityCommands::Delete { entity, force } => {
            let entity = if *force {
                resolve_any_entity(ctx, entity).await?
            } else {
                resolve_entity(ctx, entity).await?
            };
            ctx.service.delete_entity(&entity.id, *force).await?;

            if *force {
                println!("Permanently deleted entity: {}", entity.name);
            } else {
                println!(
                    "Deleted entity: {} (restore with: tangle entity restore {})",
                    entity.name, entity.id
                );
            }
        }
        EntityCommands::Restore { entity } => {
            let entity = resolve_any_entity(ctx, entity).await?;
            let restored = ctx.service.restore_entity(&entity.id).await?;

            if ctx.format.is_json() {
                println!("{}", to_json(&restored)?);
            } else {
                println!("Restored entity: {}", entity_line(&restored));
            }
        }
        EntityCommands::Observe {
            entity,
            content,
            source,
            confidence,
            meta,
        } => {
            let entity = resolve_entity(ctx, entity).await?;

            let mut new = NewObservation::new(content);
            if let Some(source) = source {
                new = new.with_source(source);
            }
            if let Some(confidence) = confidence {
                new = new.with_confidence(*confidence);
            }
            if let Some(metadata) = parse_metadata(meta)? {
                new = new.with_metadata(metadata);
            }

            let observation = ctx.service.add_observation(&entity.id, new).await?;
            if ctx.format.is_json() {
                println!("{}", to_json(&observation)?);
            } else {
                println!("Added observation to '{}':", entity.name);
                println!("  {}", observation_line(&observation));
            }
        }
        EntityCommands::Related {
            entity,
            r#type,
            depth,
        } => {
            let entity = resolve_entity(ctx, entity).await?;
            let related = match r#type {
                Some(t) => ctx.service.related_of_type(&entity.id, t).await?,
                None => ctx.service.all_related(&entity.id, *depth).await?,
            };

            if ctx.format.is_json() {
                println!("{}", to_json(&related)?);
            } else if related.is_empty() {
                println!("No related entities for '{}'", entity.name);
            } else {
                println!("Related to '{}' ({} found):", entity.name, related.len());
                for other in &related {
                    println!("  {}", entity_line(other));
                }
            }
        }
    }

    Ok(())
}
