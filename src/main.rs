use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};

use docs_generator::config::{init_default_config, resolve_config, ResolvedConfig, CONFIG_FILE_NAME};
use docs_generator::pipeline::{
    collect_inputs, merge_data_sheets, DocumentGenerator, InputSelection, LoadedFile,
    TemplateGenerator,
};
use docs_generator::progress::ConsoleProgress;
use docs_generator::store::{DependencyStore, KeyStore};
use docs_generator::template::DataDocument;

#[derive(Parser, Debug)]
#[command(name = "docs-generator")]
#[command(about = "Turn {tag} documents into bound DOCX templates and fill them from data sheets", long_about = None)]
struct Args {
    /// Config file path (default: $DOCS_GENERATOR_CONFIG or search for docs-generator.toml upwards)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Suppress progress output on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate templates and data sheets from documents containing {tag} placeholders
    Generate {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output directory (default: [output].dir from config)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Fill generated templates from one data sheet
    Fill {
        #[command(flatten)]
        inputs: InputArgs,

        /// Filled data sheet (.xml)
        #[arg(long, value_name = "XML")]
        sheet: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Merge data sheets into one `<stamp>_data_sheet.xml`
    Merge {
        #[arg(value_name = "XML", required = true)]
        sheets: Vec<PathBuf>,

        /// Existing output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Inspect or edit a data sheet
    Sheet {
        #[command(subcommand)]
        action: SheetAction,
    },
    /// Tag suggestion store
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Key/value dependency store
    Deps {
        #[command(subcommand)]
        action: DepsAction,
    },
    /// Write a default docs-generator.toml, then exit
    InitConfig {
        /// Directory to write the config into (default: current directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Input files
    #[arg(value_name = "DOCX", conflicts_with = "from_dir")]
    files: Vec<PathBuf>,

    /// Load every .docx from this folder
    #[arg(long, value_name = "DIR")]
    from_dir: Option<PathBuf>,

    /// File key: filters folder input and is stripped from output names
    #[arg(long, conflicts_with = "all")]
    key: Option<String>,

    /// Load every file in the folder, ignoring the file key
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand, Debug)]
enum SheetAction {
    /// Print `name = value` for every element
    Show {
        #[arg(value_name = "XML")]
        sheet: PathBuf,
    },
    /// Set element values and save the sheet
    Set {
        #[arg(value_name = "XML")]
        sheet: PathBuf,

        #[arg(value_name = "NAME=VALUE", required = true)]
        assignments: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum KeysAction {
    /// Print every stored key
    List,
    /// Replace the store with a validated JSON file
    Import {
        #[arg(value_name = "JSON")]
        file: PathBuf,
    },
    /// Add keys that are not stored yet
    Add {
        #[arg(value_name = "KEY", required = true)]
        values: Vec<String>,
    },
    /// Replace the store with exactly these keys (validated)
    Set {
        #[arg(value_name = "KEY", required = true)]
        values: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum DepsAction {
    /// Print the dependency tree
    Show,
    /// Replace the store with a validated JSON file
    Import {
        #[arg(value_name = "JSON")]
        file: PathBuf,
    },
    /// Add or update a value under a key; new values inherit the latest sub-keys
    Add {
        key: String,
        value: String,

        #[arg(value_name = "SUBKEY=SUBVALUE")]
        pairs: Vec<String>,
    },
    /// Print the sub-value for key / value / sub-key (case-insensitive)
    Lookup {
        key: String,
        value: String,
        sub_key: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if let Command::InitConfig { dir, force } = &args.command {
        let dir = dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, *force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let cfg = resolve_config(args.config.as_deref(), &workdir).context("load config")?;
    match &cfg.path {
        Some(p) => progress.info(format!("config: {}", p.display())),
        None => progress.info(format!("config: built-in defaults (no {CONFIG_FILE_NAME} found)")),
    }

    match args.command {
        Command::Generate { inputs, output } => {
            let out_dir = output_dir(output, &cfg)?;
            let files = load_inputs(&inputs, None, &cfg)?;
            if files.is_empty() {
                return Err(anyhow!("no input documents"));
            }
            let keys = KeyStore::new(cfg.keys_path());
            let generator = TemplateGenerator {
                template_naming: &cfg.config.naming.template,
                sheet_naming: &cfg.config.naming.data_sheet,
                keys: Some(&keys),
                progress: &progress,
            };
            let report = generator.generate(&files, &out_dir)?;
            for f in &report.failures {
                let at = f.stage.map(|s| s.to_string()).unwrap_or_else(|| "start".to_string());
                eprintln!("failed: {} (after {at}): {}", f.file.display(), f.message);
            }
            if let Some(merged) = &report.merged_sheet {
                println!("merged sheet: {}", merged.display());
            }
            println!("{}", report.summary());
            Ok(exit_code(report.has_errors()))
        }
        Command::Fill {
            inputs,
            sheet,
            output,
        } => {
            let out_dir = output_dir(output, &cfg)?;
            let default_key = cfg.config.naming.template.key.clone();
            let files = load_inputs(&inputs, Some(default_key), &cfg)?;
            if files.is_empty() {
                return Err(anyhow!("no templates to fill"));
            }
            let generator = DocumentGenerator {
                naming: &cfg.config.naming.document,
                progress: &progress,
            };
            let report = generator.generate(&files, &sheet, &out_dir)?;
            for (file, msg) in &report.failures {
                eprintln!("failed: {}: {msg}", file.display());
            }
            println!("{}", report.summary());
            Ok(exit_code(report.has_errors()))
        }
        Command::Merge { sheets, output } => {
            let out_dir = output_dir(output, &cfg)?;
            let report = merge_data_sheets(&sheets, &out_dir, &chrono::Local::now(), &progress)?;
            println!(
                "merge finished: {} sheet(s), {} element(s); output: {}",
                report.sources,
                report.elements,
                report.output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Sheet { action } => run_sheet(action),
        Command::Keys { action } => run_keys(action, &cfg),
        Command::Deps { action } => run_deps(action, &cfg),
        Command::InitConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn exit_code(has_errors: bool) -> ExitCode {
    if has_errors {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn output_dir(arg: Option<PathBuf>, cfg: &ResolvedConfig) -> anyhow::Result<PathBuf> {
    arg.or_else(|| cfg.output_dir())
        .context("missing -o/--output (and no [output].dir in config)")
}

/// Explicit files keep the key they were given; folder input is filtered by it.
fn load_inputs(
    inputs: &InputArgs,
    default_key: Option<String>,
    cfg: &ResolvedConfig,
) -> anyhow::Result<Vec<LoadedFile>> {
    let key = if inputs.all {
        None
    } else {
        inputs.key.clone().or(default_key).filter(|k| !k.is_empty())
    };
    match &inputs.from_dir {
        Some(dir) => {
            let selection = match key {
                Some(key) => InputSelection::Keyed {
                    key,
                    filter: cfg.config.input.key_filter,
                },
                None => InputSelection::All,
            };
            collect_inputs(dir, "docx", &selection)
        }
        None => Ok(inputs
            .files
            .iter()
            .map(|p| LoadedFile::new(p.clone(), key.clone().unwrap_or_default()))
            .collect()),
    }
}

fn run_sheet(action: SheetAction) -> anyhow::Result<ExitCode> {
    match action {
        SheetAction::Show { sheet } => {
            let doc = DataDocument::load(&sheet)?;
            for e in &doc.entries {
                println!("{} = {}", e.name, e.value);
            }
            Ok(ExitCode::SUCCESS)
        }
        SheetAction::Set { sheet, assignments } => {
            let mut doc = DataDocument::load(&sheet)?;
            let mut unknown = Vec::new();
            for a in &assignments {
                let (name, value) = a
                    .split_once('=')
                    .with_context(|| format!("expected NAME=VALUE, got: {a}"))?;
                if !doc.set_value(name.trim(), value) {
                    unknown.push(name.trim().to_string());
                }
            }
            if !unknown.is_empty() {
                return Err(anyhow!(
                    "unknown element(s) in {}: {}; sheet not saved",
                    sheet.display(),
                    unknown.join(", ")
                ));
            }
            doc.save(&sheet)?;
            println!("sheet updated: {} value(s); output: {}", assignments.len(), sheet.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_keys(action: KeysAction, cfg: &ResolvedConfig) -> anyhow::Result<ExitCode> {
    let store = KeyStore::new(cfg.keys_path());
    match action {
        KeysAction::List => {
            for k in store.load() {
                println!("{k}");
            }
        }
        KeysAction::Import { file } => {
            let keys = store.import(&file)?;
            println!("imported {} key(s); output: {}", keys.len(), store.path().display());
        }
        KeysAction::Add { values } => {
            let changed = store.merge_new(&values)?;
            let status = if changed { "updated" } else { "unchanged" };
            println!("keys {status}; output: {}", store.path().display());
        }
        KeysAction::Set { values } => {
            let keys = store.replace_all(&values)?;
            println!("stored {} key(s); output: {}", keys.len(), store.path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_deps(action: DepsAction, cfg: &ResolvedConfig) -> anyhow::Result<ExitCode> {
    let store = DependencyStore::new(cfg.dependencies_path());
    match action {
        DepsAction::Show => {
            print_dependencies(&store.load());
            Ok(ExitCode::SUCCESS)
        }
        DepsAction::Import { file } => {
            let deps = store.import(&file)?;
            println!(
                "imported {} key(s); output: {}",
                deps.keys.len(),
                store.path().display()
            );
            Ok(ExitCode::SUCCESS)
        }
        DepsAction::Add { key, value, pairs } => {
            let pairs = pairs
                .iter()
                .map(|p| {
                    p.split_once('=')
                        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                        .with_context(|| format!("expected SUBKEY=SUBVALUE, got: {p}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let deps = store.add_value(&key, &value, &pairs)?;
            println!(
                "{key} has {} value(s); output: {}",
                deps.values_for_key(&key).len(),
                store.path().display()
            );
            Ok(ExitCode::SUCCESS)
        }
        DepsAction::Lookup {
            key,
            value,
            sub_key,
        } => {
            let deps = store.load();
            match deps.sub_value(&key, &value, &sub_key) {
                Some(v) => {
                    println!("{v}");
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("not found: {key} / {value} / {sub_key} in {}", store.path().display());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn print_dependencies(deps: &docs_generator::store::Dependencies) {
    for k in &deps.keys {
        println!("{}", k.name);
        for v in &k.values {
            println!("  {}", v.name);
            for p in &v.sub_pairs {
                println!("    {} = {}", p.sub_key, p.sub_value);
            }
        }
    }
}
