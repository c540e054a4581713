// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowcanvas_rs::workflow::canvas::{canvas_to_schemas, CanvasLoader};
use flowcanvas_rs::workflow::convert::{convert, ConvertOptions};
use flowcanvas_rs::workflow::template::{render, RenderOptions};
use flowcanvas_rs::workflow::types::TypeInfo;
use flowcanvas_rs::workflow::validate::{
    validate_tree, Collaborators, InMemoryWorkflowRepository, UniformVariablesMeta, ValidateConfig,
    VariablesMeta,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate one or more canvases and print their issues as JSON
    Validate {
        /// Canvas files (JSON or YAML)
        #[arg(short, long, required = true, num_args = 1..)]
        file: Vec<PathBuf>,

        /// Validation settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Declared global variables (YAML map of name to type)
        #[arg(long)]
        variables: Option<PathBuf>,

        /// App whose global variables are checked
        #[arg(long, conflicts_with = "agent_id")]
        app_id: Option<i64>,

        /// Agent whose global variables are checked
        #[arg(long)]
        agent_id: Option<String>,

        /// Directory of sub-workflow drafts named `<id>.json`
        #[arg(long)]
        workflows: Option<PathBuf>,

        /// Keep isolated nodes
        #[arg(long)]
        no_prune: bool,
    },
    /// Render a template against a JSON object
    Render {
        #[arg(short, long)]
        template: String,

        /// JSON object the template reads from
        #[arg(short, long)]
        input: String,

        /// Text rendered for null values
        #[arg(long)]
        nil: Option<String>,
    },
    /// Convert a JSON value against a type schema
    Convert {
        /// TypeInfo schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        #[arg(short, long)]
        input: String,

        /// Treat conversion warnings as errors
        #[arg(long, env = "FLOWCANVAS_FAIL_FAST")]
        fail_fast: bool,
    },
    /// Print the input and output JSON Schema of every node
    Schema {
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Validate {
            file,
            config,
            variables,
            app_id,
            agent_id,
            workflows,
            no_prune,
        } => {
            let mut validate_config = match config {
                Some(path) => ValidateConfig::from_file(&path)?,
                None => ValidateConfig::default(),
            };
            if app_id.is_some() {
                validate_config.app_id = app_id;
            }
            if agent_id.is_some() {
                validate_config.agent_id = agent_id;
            }
            if no_prune {
                validate_config.prune = false;
            }

            let mut collaborators = Collaborators::new();
            if let Some(path) = variables {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read variables file {}", path.display()))?;
                let meta: VariablesMeta = serde_yaml::from_str(&content)?;
                log::info!("Loaded {} global variables", meta.len());
                collaborators = collaborators.with_variables(Arc::new(UniformVariablesMeta::new(meta)));
            }
            if let Some(dir) = workflows {
                let repository = load_workflow_dir(&dir).await?;
                collaborators = collaborators.with_repository(Arc::new(repository));
            }

            let loader = CanvasLoader::new();
            let runs = file.iter().map(|path| {
                let config = validate_config.clone();
                let collaborators = collaborators.clone();
                let canvas = loader.load_canvas(path);
                async move {
                    let issues = validate_tree(canvas?, config, collaborators).await?;
                    Ok::<_, flowcanvas_rs::error::FlowError>(issues)
                }
            });

            let mut report = Map::new();
            let mut failed = false;
            for (path, result) in file.iter().zip(join_all(runs).await) {
                let entry = match result {
                    Ok(issues) => {
                        log::info!("{}: {} issues", path.display(), issues.len());
                        failed |= !issues.is_empty();
                        json!({"issues": issues})
                    }
                    Err(e) => {
                        log::warn!("{}: validation failed: {}", path.display(), e);
                        failed = true;
                        json!({"error": e.to_string()})
                    }
                };
                report.insert(path.display().to_string(), entry);
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
            if failed {
                std::process::exit(1);
            }
        }
        Commands::Render {
            template,
            input,
            nil,
        } => {
            let input: Map<String, Value> =
                serde_json::from_str(&input).context("input must be a JSON object")?;
            let mut options = RenderOptions::new();
            if let Some(text) = nil {
                options = options.with_nil_renderer(move || text.clone());
            }

            let rendered = render(&template, &input, &BTreeMap::new(), &options)?;
            println!("{}", rendered);
        }
        Commands::Convert {
            schema,
            input,
            fail_fast,
        } => {
            let content = fs::read_to_string(&schema)
                .with_context(|| format!("failed to read schema {}", schema.display()))?;
            let info: TypeInfo = serde_json::from_str(&content)?;
            let value: Value = serde_json::from_str(&input).context("input must be JSON")?;

            let mut options = ConvertOptions::new();
            if fail_fast {
                options = options.fail_fast();
            }

            let (converted, warnings) = convert(&value, "input", &info, &options)?;
            let warnings: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"output": converted, "warnings": warnings}))?
            );
        }
        Commands::Schema { file } => {
            let canvas = CanvasLoader::new().load_canvas(&file)?;
            let schemas = canvas_to_schemas(&canvas)?;

            let mut out = Map::new();
            for (key, ns) in &schemas {
                out.insert(
                    key.clone(),
                    json!({
                        "type": ns.node_type.code(),
                        "input": ns.input_json_schema(),
                        "output": ns.output_json_schema(),
                    }),
                );
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

/// Load every `<id>.json` canvas in `dir` as a sub-workflow draft
async fn load_workflow_dir(dir: &Path) -> anyhow::Result<InMemoryWorkflowRepository> {
    let repository = InMemoryWorkflowRepository::new();
    let loader = CanvasLoader::new();

    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i64>().ok())
        else {
            log::debug!("skipping {}", path.display());
            continue;
        };

        let canvas = loader.load_canvas(&path)?;
        repository.save_draft(id, &canvas).await?;
        log::info!("Registered sub workflow {} from {}", id, path.display());
    }

    Ok(repository)
}
