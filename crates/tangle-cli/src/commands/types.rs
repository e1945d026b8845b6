//! Relationship type commands

use clap::{Args, Subcommand};
use tangle_core::{FieldRules, RelationshipType};

use crate::output::{relationship_type_summary, to_json};
use crate::AppContext;

#[derive(Args)]
pub struct TypeArgs {
    #[command(subcommand)]
    pub command: TypeCommands,
}

#[derive(Subcommand)]
pub enum TypeCommands {
    /// Register a new relationship type
    Register {
        /// Type name
        name: String,
        /// Name of the mirror edge type; implies --bidirectional
        #[arg(short, long)]
        inverse: Option<String>,
        /// Create a mirror edge for every relationship
        #[arg(short, long)]
        bidirectional: bool,
        /// Entity types allowed as source (comma separated)
        #[arg(long, value_delimiter = ',')]
        from: Vec<String>,
        /// Entity types allowed as target (comma separated)
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,
        /// Metadata fields every relationship must carry (repeatable)
        #[arg(short, long)]
        require: Vec<String>,
        /// Field rules as JSON, e.g. '{"priority":[{"rule":"range","min":1,"max":5}]}'
        #[arg(long)]
        rules: Option<String>,
    },
    /// List registered relationship types
    List,
    /// Show a relationship type definition
    Show {
        /// Type name
        name: String,
    },
    /// Retire a relationship type so it can no longer be used
    Retire {
        /// Type name
        name: String,
    },
}

pub async fn run(args: &TypeArgs, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        TypeCommands::Register {
            name,
            inverse,
            bidirectional,
            from,
            to,
            require,
            rules,
        } => {
            let mut definition = RelationshipType::new(name);
            if let Some(inverse) = inverse {
                definition = definition.with_inverse(inverse);
            } else if *bidirectional {
                definition = definition.bidirectional();
            }
            if !from.is_empty() {
                definition = definition.allow_from(from.iter().cloned());
            }
            if !to.is_empty() {
                definition = definition.allow_to(to.iter().cloned());
            }
            if !require.is_empty() {
                definition = definition.require_fields(require.iter().cloned());
            }
            if let Some(rules) = rules {
                for (field, field_rules) in parse_rules(rules)? {
                    for rule in field_rules {
                        definition = definition.with_rule(field.clone(), rule);
                    }
                }
            }

            let registered = ctx.registry.register(definition).await?;
            if ctx.format.is_json() {
                println!("{}", to_json(&registered)?);
            } else {
                println!(
                    "Registered relationship type '{}'",
                    relationship_type_summary(&registered)
                );
            }
        }
        TypeCommands::List => {
            let types = ctx.registry.all_types();
            if ctx.format.is_json() {
                println!("{}", to_json(&types)?);
            } else if types.is_empty() {
                println!("No relationship types registered");
            } else {
                println!("Relationship types ({} found):", types.len());
                for definition in &types {
                    println!("  {}", relationship_type_summary(definition));
                }
            }
        }
        TypeCommands::Show { name } => {
            let definition = ctx
                .registry
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("Relationship type '{}' not found", name))?;

            if ctx.format.is_json() {
                println!("{}", to_json(&definition)?);
                return Ok(());
            }

            println!("Relationship type: {}", relationship_type_summary(&definition));
            println!("  ID: {}", definition.id);
            if let Some(allowed) = &definition.allowed_entity_types {
                if !allowed.from.is_empty() {
                    println!("  From: {}", allowed.from.join(", "));
                }
                if !allowed.to.is_empty() {
                    println!("  To: {}", allowed.to.join(", "));
                }
            }
            if !definition.required_metadata_fields.is_empty() {
                println!(
                    "  Required fields: {}",
                    definition.required_metadata_fields.join(", ")
                );
            }
            if !definition.validation_rules.is_empty() {
                println!("  Rules:");
                for (field, rules) in &definition.validation_rules {
                    println!("    {}: {}", field, serde_json::to_string(rules)?);
                }
            }
        }
        TypeCommands::Retire { name } => {
            ctx.registry.retire(name).await?;
            println!("Retired relationship type '{}'", name);
        }
    }

    Ok(())
}

fn parse_rules(raw: &str) -> anyhow::Result<FieldRules> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid --rules JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_core::{FieldRule, ValueKind};

    #[test]
    fn test_parse_rules() {
        let rules = parse_rules(
            r#"{"priority":[{"rule":"type","kind":"integer"},{"rule":"range","min":1,"max":5}]}"#,
        )
        .unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules["priority"],
            vec![
                FieldRule::of_type(ValueKind::Integer),
                FieldRule::range(1.0, 5.0)
            ]
        );
        assert!(parse_rules("[1, 2]").is_err());
    }
}
