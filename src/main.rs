use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use ubkg::db::{migrate, Db};
use ubkg::lookup::TermSearchRequest;
use ubkg::reduce::DatasetFilter;
use ubkg::{Config, Direction, FilterSpec, QueryEngine, TraversalMode, TraversalRequest, UbkgError};

#[derive(Parser, Debug)]
#[command(name = "ubkg")]
#[command(about = "Query a UMLS-style terminology knowledge graph")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct TraversalArgs {
    /// Start concept (CUI)
    start: String,

    /// Relationship filter `Type[SAB]`; `*` is a wildcard. Repeatable.
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    /// Allowed relationship source. Repeatable; none allows all.
    #[arg(short, long = "sab")]
    sabs: Vec<String>,

    /// Maximum number of hops (expand and tree)
    #[arg(short, long, default_value_t = 1)]
    depth: usize,

    /// Follow edges from their end node to their start node
    #[arg(long)]
    incoming: bool,
}

impl TraversalArgs {
    fn into_request(self, mode: TraversalMode) -> Result<TraversalRequest> {
        let direction = if self.incoming {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };
        Ok(TraversalRequest::new(self.start, mode)
            .with_filters(FilterSpec::parse(&self.filters)?)
            .with_sabs(self.sabs)
            .with_depth(self.depth)
            .with_direction(direction))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and check the store schema (default)
    Verify {
        #[arg(long, default_value = "migrations")]
        migrations: PathBuf,
    },
    /// Every path of 1..=depth hops
    Expand(TraversalArgs),
    /// Distinct concepts reached by expand, start included
    ExpandConcepts(TraversalArgs),
    /// Paths whose i-th hop matches the i-th filter
    Path(TraversalArgs),
    /// Fewest-hop path to a target concept
    ShortestPath {
        #[command(flatten)]
        traversal: TraversalArgs,
        #[arg(short, long)]
        target: String,
    },
    /// At most one path per reached concept
    Tree(TraversalArgs),
    /// Dataset descriptors of an application context
    Dataset {
        context: String,
        #[arg(long)]
        data_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        alt_name: Option<String>,
        #[arg(long)]
        primary: Option<String>,
        #[arg(long)]
        contains_pii: Option<String>,
        #[arg(long)]
        vis_only: Option<String>,
        #[arg(long)]
        vitessce_hint: Option<String>,
        #[arg(long)]
        dataset_provider: Option<String>,
    },
    /// One assay type of an application context
    AssayType { name: String, context: String },
    /// Children of a parent code, one preferred code each
    Valueset {
        sab: String,
        code: String,
        /// Child sources in preference order. Repeatable.
        #[arg(short, long = "child-sab", required = true)]
        child_sabs: Vec<String>,
    },
    /// Codes sharing a concept with a code
    CodeCodes {
        code_id: String,
        #[arg(short, long = "sab")]
        sabs: Vec<String>,
    },
    /// Concepts owning a code
    CodeConcepts { code_id: String },
    /// Codes of a concept
    ConceptCodes {
        cui: String,
        #[arg(short, long = "sab")]
        sabs: Vec<String>,
    },
    /// Concepts with an edge into a concept
    ConceptConcepts { cui: String },
    ConceptDefinitions { cui: String },
    ConceptSemantics { cui: String },
    /// Semantic types a named type points at by ISA_STY; empty lists all
    SemanticParents {
        #[arg(default_value = "")]
        name: String,
    },
    /// Semantic type by TUI; empty lists all
    Tui {
        #[arg(default_value = "")]
        tui: String,
    },
    TermCodes { term: String },
    TermConcepts { term: String },
    TermTerms { term: String },
    /// Exact term match, optional one-hop move, codes and terms of the result
    TermSearch {
        term: String,
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        #[arg(short, long = "sab")]
        sabs: Vec<String>,
        #[arg(short, long = "tty")]
        ttys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.ubkg.log_level.as_str())
    ).init();

    if let Err(e) = run(cli.command, &config).await {
        if let Some(err) = e.downcast_ref::<UbkgError>().filter(|err| err.is_client_error()) {
            log::error!("{}", err);
            std::process::exit(2);
        }
        return Err(e);
    }
    Ok(())
}

async fn run(command: Option<Command>, config: &Config) -> Result<()> {
    let command = command.unwrap_or(Command::Verify {
        migrations: PathBuf::from("migrations"),
    });
    if let Command::Verify { migrations } = &command {
        return run_schema_verification(config, migrations).await;
    }

    let engine = QueryEngine::from_config(config);
    let started = Instant::now();
    match command {
        Command::Verify { .. } => {}
        Command::Expand(args) => print_json(&engine.expand(args.into_request(TraversalMode::Expand)?).await?)?,
        Command::ExpandConcepts(args) => {
            print_json(&engine.expand_concepts(args.into_request(TraversalMode::Expand)?).await?)?
        }
        Command::Path(args) => print_json(&engine.path(args.into_request(TraversalMode::Path)?).await?)?,
        Command::ShortestPath { traversal, target } => {
            let request = traversal.into_request(TraversalMode::ShortestPath)?.with_target(target);
            print_json(&engine.shortest_path(request).await?)?
        }
        Command::Tree(args) => {
            print_json(&engine.spanning_tree(args.into_request(TraversalMode::SpanningTree)?).await?)?
        }
        Command::Dataset {
            context,
            data_type,
            description,
            alt_name,
            primary,
            contains_pii,
            vis_only,
            vitessce_hint,
            dataset_provider,
        } => {
            let filter = DatasetFilter {
                data_type,
                description,
                alt_name,
                primary,
                contains_pii,
                vis_only,
                vitessce_hint,
                dataset_provider,
            };
            print_json(&engine.dataset(&context, &filter).await?)?
        }
        Command::AssayType { name, context } => print_json(&engine.assay_type(&name, &context).await?)?,
        Command::Valueset { sab, code, child_sabs } => {
            print_json(&engine.valueset(&sab, &code, &child_sabs).await?)?
        }
        Command::CodeCodes { code_id, sabs } => print_json(&engine.codes_for_code(&code_id, &sabs).await?)?,
        Command::CodeConcepts { code_id } => print_json(&engine.concepts_for_code(&code_id).await?)?,
        Command::ConceptCodes { cui, sabs } => print_json(&engine.codes_for_concept(&cui, &sabs).await?)?,
        Command::ConceptConcepts { cui } => print_json(&engine.related_concepts(&cui).await?)?,
        Command::ConceptDefinitions { cui } => print_json(&engine.definitions(&cui).await?)?,
        Command::ConceptSemantics { cui } => print_json(&engine.semantics_for_concept(&cui).await?)?,
        Command::SemanticParents { name } => print_json(&engine.semantic_parents(&name).await?)?,
        Command::Tui { tui } => print_json(&engine.semantics_for_tui(&tui).await?)?,
        Command::TermCodes { term } => print_json(&engine.codes_for_term(&term).await?)?,
        Command::TermConcepts { term } => print_json(&engine.concepts_for_term(&term).await?)?,
        Command::TermTerms { term } => print_json(&engine.concept_terms_for_term(&term).await?)?,
        Command::TermSearch {
            term,
            filters,
            sabs,
            ttys,
        } => {
            let request = TermSearchRequest {
                term,
                filters: FilterSpec::parse(&filters)?,
                sabs,
                ttys,
            };
            print_json(&engine.term_search(&request).await?)?
        }
    }
    log::info!("done in {:?}", started.elapsed());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Apply pending migrations and check that every graph table exists
async fn run_schema_verification(config: &Config, migrations_dir: &Path) -> Result<()> {
    log::info!("Starting UBKG v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    let migrations_dir = migrations_dir.to_path_buf();
    let missing = db
        .with_connection(move |conn| {
            let applied = migrate::run_migrations(conn, &migrations_dir)?;
            for name in &applied {
                log::info!("Applied migration {}", name);
            }

            let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
            if integrity != "ok" {
                return Err(UbkgError::Config(format!("Database integrity check failed: {}", integrity)));
            }

            migrate::missing_tables(conn)
        })
        .await?;

    if !missing.is_empty() {
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        anyhow::bail!("Not all required tables exist");
    }

    log::info!("✓ Database schema verification complete");
    Ok(())
}
