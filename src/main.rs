use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pbxedit::diagnostic::ansi::AnsiRenderer;
use pbxedit::diagnostic::{Diagnostic, json, registry};
use pbxedit::edit::Editor;
use pbxedit::model::{Bucket, Document};
use pbxedit::plan::{FileRequest, Plan};
use pbxedit::report::{AddedFile, Failure, Report};
use pbxedit::scan::{Scanner, missing_files};
use pbxedit::{parser, serializer, verify};

/// Exit status when the descriptor could not be read or parsed.
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "pbxedit", version, about = "Add files to Xcode projects without breaking them")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colours in diagnostics (also honours NO_COLOR)
    #[arg(long, global = true)]
    no_color: bool,

    /// Machine-readable output: JSON report on stdout, JSON diagnostics on stderr
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Register source files, resources or libraries in a target
    Add(AddArgs),
    /// Link system frameworks such as Metal or AVFoundation
    Framework(FrameworkArgs),
    /// Check every cross-reference in the descriptor
    Check {
        #[arg(env = "PBXEDIT_PROJECT")]
        project: PathBuf,
    },
    /// List files on disk the project does not reference
    Missing {
        #[arg(env = "PBXEDIT_PROJECT")]
        project: PathBuf,
        #[arg(long)]
        scan: PathBuf,
        #[arg(long, value_delimiter = ',', default_value = "swift")]
        ext: Vec<String>,
    },
    /// Explain a diagnostic code such as PBX-E003
    Explain {
        code: Option<String>,
        /// List every code with a one-line summary
        #[arg(long)]
        list: bool,
    },
}

#[derive(Args)]
struct AddArgs {
    /// Path to project.pbxproj or the .xcodeproj bundle
    #[arg(env = "PBXEDIT_PROJECT")]
    project: PathBuf,

    /// Files to add, as paths relative to their group
    files: Vec<String>,

    /// Group path below the main group, e.g. Core/Camera
    #[arg(long)]
    group: Option<String>,

    #[arg(long, default_value = "compile-sources")]
    bucket: Bucket,

    /// Target whose phases receive the files (default: first target)
    #[arg(long)]
    target: Option<String>,

    /// JSON plan file with more requests
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Add every matching file found under this directory, in groups
    /// mirroring its folders
    #[arg(long)]
    scan: Option<PathBuf>,

    /// Extensions picked up by --scan
    #[arg(long, value_delimiter = ',', default_value = "swift")]
    ext: Vec<String>,

    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,

    /// Print the edited descriptor instead of writing it
    #[arg(long)]
    stdout: bool,
}

#[derive(Args)]
struct FrameworkArgs {
    #[arg(env = "PBXEDIT_PROJECT")]
    project: PathBuf,

    /// Framework names; `.framework` is appended when missing
    #[arg(required = true)]
    names: Vec<String>,

    #[arg(long)]
    target: Option<String>,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    stdout: bool,
}

/// Where diagnostics and reports go.
struct Output {
    json: bool,
    renderer: AnsiRenderer,
}

impl Output {
    fn diagnostic(&self, d: &Diagnostic) {
        if self.json {
            eprintln!("{}", json::render(d));
        } else {
            eprint!("{}", self.renderer.render(d));
        }
    }

    fn failure(&self, f: &Failure) {
        let mut d = Diagnostic::error(&f.message).with_code(f.code).with_note(format!("while adding '{}'", f.path));
        if let Some(entry) = registry::lookup(f.code) {
            d = d.with_suggestion(format!("{}; see `pbxedit explain {}`", entry.short, f.code));
        }
        self.diagnostic(&d);
    }

    /// Report on stdout, or on stderr when stdout carries the descriptor.
    fn report(&self, report: &Report, descriptor_on_stdout: bool) {
        let text = if self.json { report.to_json() + "\n" } else { report.render_text() };
        if descriptor_on_stdout {
            eprint!("{text}");
        } else {
            print!("{text}");
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// `Foo.xcodeproj` (or any directory) means the descriptor inside it.
fn descriptor_path(project: &Path) -> PathBuf {
    if project.is_dir() {
        project.join("project.pbxproj")
    } else {
        project.to_path_buf()
    }
}

struct Loaded {
    path: PathBuf,
    source: String,
    doc: Document,
}

fn load(project: &Path) -> Result<Loaded, Diagnostic> {
    let path = descriptor_path(project);
    let source = std::fs::read_to_string(&path)
        .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", path.display())))?;
    let doc = parser::parse(&source)
        .map_err(|e| Diagnostic::from(&e).with_source(source.clone()).with_note(format!("in {}", path.display())))?;
    tracing::info!(path = %path.display(), records = doc.len(), "loaded descriptor");
    Ok(Loaded { path, source, doc })
}

fn store(loaded: &Loaded, dry_run: bool, to_stdout: bool) -> Result<(), Diagnostic> {
    let text = serializer::serialize(&loaded.doc);
    if to_stdout {
        print!("{text}");
        return Ok(());
    }
    if dry_run || text == loaded.source {
        return Ok(());
    }
    std::fs::write(&loaded.path, text)
        .map_err(|e| Diagnostic::error(format!("cannot write {}: {e}", loaded.path.display())))?;
    tracing::info!(path = %loaded.path.display(), "descriptor written");
    Ok(())
}

fn run_add(args: AddArgs, out: &Output) -> Result<ExitCode, Diagnostic> {
    let mut loaded = load(&args.project)?;

    let mut plan = match &args.plan {
        Some(path) => Plan::load(path).map_err(|e| Diagnostic::from(&e))?,
        None => Plan::default(),
    };
    for path in &args.files {
        plan.files.push(FileRequest {
            group: args.group.clone(),
            bucket: args.bucket,
            ..FileRequest::new(path.as_str())
        });
    }
    if let Some(dir) = &args.scan {
        for path in Scanner::new(&args.ext).scan(dir).map_err(|e| Diagnostic::from(&e))? {
            plan.files.push(FileRequest {
                bucket: args.bucket,
                ..FileRequest::scanned(&path, args.group.as_deref())
            });
        }
    }
    if plan.files.is_empty() {
        return Err(Diagnostic::error("nothing to add").with_suggestion("name files, or pass --plan or --scan"));
    }

    let mut editor = Editor::new(&mut loaded.doc);
    let report = plan.apply(&mut editor, args.target.as_deref());

    for warning in &report.warnings {
        out.diagnostic(&Diagnostic::from(warning));
    }
    for failure in &report.errors {
        out.failure(failure);
    }
    store(&loaded, args.dry_run, args.stdout)?;
    out.report(&report, args.stdout);
    Ok(exit_for(&report))
}

fn run_framework(args: FrameworkArgs, out: &Output) -> Result<ExitCode, Diagnostic> {
    let mut loaded = load(&args.project)?;
    let mut editor = Editor::new(&mut loaded.doc);
    let mut report = Report::default();

    for name in &args.names {
        let name = if name.contains('.') { name.clone() } else { format!("{name}.framework") };
        let outcome = editor
            .resolve_phase(args.target.as_deref(), Bucket::Frameworks)
            .and_then(|phase| editor.add_framework(&name, &phase));
        match outcome {
            Ok(added) if added.changed => report.added.push(AddedFile {
                path: name,
                bucket: Bucket::Frameworks,
                file_ref: added.file_ref,
                build_file: added.build_file,
            }),
            Ok(_) => report.already_present.push(name),
            Err(err) => report.errors.push(Failure::new(&name, &err)),
        }
    }
    report.warnings = editor.take_warnings();

    for failure in &report.errors {
        out.failure(failure);
    }
    store(&loaded, args.dry_run, args.stdout)?;
    out.report(&report, args.stdout);
    Ok(exit_for(&report))
}

fn run_check(project: &Path, out: &Output) -> Result<ExitCode, Diagnostic> {
    let loaded = load(project)?;
    match verify::verify(&loaded.doc) {
        Ok(()) => {
            if !out.json {
                println!("ok: {} records, no problems found", loaded.doc.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(errors) => {
            for e in &errors {
                let d = Diagnostic::from(e);
                if out.json {
                    println!("{}", json::render(&d));
                } else {
                    print!("{}", out.renderer.render(&d));
                }
            }
            if !out.json {
                println!("{} problem(s) found", errors.len());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_missing(project: &Path, scan: &Path, ext: &[String], out: &Output) -> Result<ExitCode, Diagnostic> {
    let loaded = load(project)?;
    let found = Scanner::new(ext).scan(scan).map_err(|e| Diagnostic::from(&e))?;
    let missing = missing_files(&loaded.doc, &found);
    if out.json {
        println!("{}", serde_json::json!({ "missing": missing }));
    } else {
        for path in &missing {
            println!("{path}");
        }
    }
    Ok(if missing.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run_explain(code: Option<&str>, list: bool) -> Result<ExitCode, Diagnostic> {
    if list || code.is_none() {
        for entry in registry::REGISTRY {
            println!("{}  {}", entry.code, entry.short);
        }
        return Ok(ExitCode::SUCCESS);
    }
    let code = code.unwrap_or_default();
    match registry::lookup(code) {
        Some(entry) => {
            print!("{}", entry.long);
            Ok(ExitCode::SUCCESS)
        }
        None => Err(Diagnostic::error(format!("unknown code '{code}'"))
            .with_suggestion("run `pbxedit explain --list` for every code")),
    }
}

fn exit_for(report: &Report) -> ExitCode {
    if report.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let out = Output {
        json: cli.json,
        renderer: AnsiRenderer::from_env(cli.no_color),
    };

    let result = match cli.command {
        Command::Add(args) => run_add(args, &out),
        Command::Framework(args) => run_framework(args, &out),
        Command::Check { project } => run_check(&project, &out),
        Command::Missing { project, scan, ext } => run_missing(&project, &scan, &ext, &out),
        Command::Explain { code, list } => run_explain(code.as_deref(), list),
    };

    match result {
        Ok(code) => code,
        Err(d) => {
            out.diagnostic(&d);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
