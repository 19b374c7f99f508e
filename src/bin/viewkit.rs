//! Command-line front end: run, explain and analyze views from a site file.
#![forbid(unsafe_code)]

#[path = "viewkit/ui.rs"]
mod ui;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use viewkit::{
    plugin::PluginRegistry,
    types::{HandlerType, Value},
    view::{Diagnostic, Explain, Severity},
    EngineConfig, RenderedView, RequestContext, Site, UserContext, ViewStatus,
};

use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "viewkit",
    version,
    about = "Run declarative query-and-render views",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Engine configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SiteArgs {
    #[arg(long, value_name = "FILE", help = "Site file with tables and views")]
    site: PathBuf,
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[arg(value_name = "VIEW")]
    view: String,

    #[arg(value_name = "DISPLAY")]
    display: String,

    #[arg(long, default_value = "", help = "Request path, e.g. articles/42")]
    path: String,

    #[arg(
        long = "query",
        value_name = "KEY=VALUE",
        value_parser = parse_pair,
        help = "Query-string parameter (repeatable)"
    )]
    query: Vec<(String, String)>,

    #[arg(long, value_name = "ID", help = "Viewing user id")]
    user: Option<i64>,

    #[arg(long = "role", value_name = "ROLE", requires = "user", help = "User role")]
    roles: Vec<String>,

    #[arg(
        long = "permission",
        value_name = "PERMISSION",
        requires = "user",
        help = "User permission"
    )]
    permissions: Vec<String>,

    #[arg(
        long = "object",
        value_name = "TYPE=ID",
        value_parser = parse_pair,
        help = "Object already loaded for the request, e.g. node=42"
    )]
    objects: Vec<(String, String)>,
}

impl RequestArgs {
    fn context(&self) -> RequestContext {
        let mut ctx = RequestContext::from_path(&self.path);
        for (key, value) in &self.query {
            ctx = ctx.with_query(key.clone(), value.clone());
        }
        if let Some(id) = self.user {
            let mut user = UserContext::new(id);
            for role in &self.roles {
                user = user.with_role(role.clone());
            }
            for permission in &self.permissions {
                user = user.with_permission(permission.clone());
            }
            ctx = ctx.with_user(user);
        }
        for (ty, raw) in &self.objects {
            let value = raw
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::from(raw.as_str()));
            ctx = ctx.with_object(ty.clone(), value);
        }
        ctx
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Execute a display and print its output")]
    Run {
        #[command(flatten)]
        site: SiteArgs,
        #[command(flatten)]
        request: RequestArgs,
    },

    #[command(about = "Show the query a display would run")]
    Explain {
        #[command(flatten)]
        site: SiteArgs,
        #[command(flatten)]
        request: RequestArgs,
    },

    #[command(about = "Check view definitions without executing them")]
    Analyze {
        #[command(flatten)]
        site: SiteArgs,

        #[arg(value_name = "VIEW", help = "Only this view")]
        view: Option<String>,
    },

    #[command(about = "List registered plugins")]
    Plugins {
        #[arg(long = "type", value_name = "TYPE", help = "Only this handler type")]
        ty: Option<HandlerType>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Html,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::load(cli.config.clone())?;
    init_tracing(config.log_filter.as_deref());
    let ui = Ui::new(cli.theme);
    let registry = Arc::new(PluginRegistry::with_builtins());

    match cli.command {
        Command::Run { site, request } => {
            let site = Site::load(&site.site)?;
            let engine = site.engine(registry, config);
            let view = site.view(&request.view)?;
            let rendered = engine.run(view, &request.display, &request.context())?;
            match cli.format {
                OutputFormat::Html => println!("{}", rendered.html()),
                OutputFormat::Json => print_json(&rendered)?,
                OutputFormat::Text => print_rendered_text(&ui, &rendered),
            }
        }
        Command::Explain { site, request } => {
            let site = Site::load(&site.site)?;
            let engine = site.engine(registry, config);
            let view = site.view(&request.view)?;
            let explain = engine.explain(view, &request.display, &request.context())?;
            match cli.format {
                OutputFormat::Json => print_json(&explain)?,
                OutputFormat::Text | OutputFormat::Html => print_explain_text(&ui, &explain),
            }
        }
        Command::Analyze { site, view } => {
            let site = Site::load(&site.site)?;
            let engine = site.engine(registry, config);
            let views = match &view {
                Some(id) => vec![site.view(id)?],
                None => site.views.values().collect(),
            };
            let diagnostics: Vec<Diagnostic> =
                views.into_iter().flat_map(|view| engine.analyze(view)).collect();
            match cli.format {
                OutputFormat::Json => print_json(&diagnostics)?,
                OutputFormat::Text | OutputFormat::Html => {
                    if diagnostics.is_empty() {
                        ui.success("no problems found");
                    }
                    for diagnostic in &diagnostics {
                        ui.diagnostic(diagnostic);
                    }
                }
            }
            if diagnostics.iter().any(|d| d.severity == Severity::Error) {
                std::process::exit(2);
            }
        }
        Command::Plugins { ty } => {
            let rows = plugin_rows(&registry, ty);
            match cli.format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Text | OutputFormat::Html => {
                    for ty in HandlerType::ALL {
                        ui.list(
                            ty.as_str(),
                            rows.iter()
                                .filter(|row| row.ty == ty)
                                .map(|row| format!("{} ({})", row.id, row.title)),
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(fallback: Option<&str>) {
    let filter = EnvFilter::try_from_env("VIEWKIT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or("warn")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn print_rendered_text(ui: &Ui, rendered: &RenderedView) {
    if rendered.status != ViewStatus::Ok {
        ui.warn(&format!("display ended early: {:?}", rendered.status));
    }
    ui.section(
        "Result",
        [
            ("status", format!("{:?}", rendered.status)),
            ("title", rendered.title.clone().unwrap_or_default()),
            ("rows", rendered.rows.to_string()),
            (
                "plan hash",
                rendered
                    .plan_hash
                    .map(|hash| format!("{hash:016x}"))
                    .unwrap_or_default(),
            ),
        ],
    );
    ui.list(
        "Arguments",
        rendered
            .arguments
            .iter()
            .map(|arg| format!("{} = {} ({:?})", arg.field, arg.summary, arg.source)),
    );
    if !rendered.node.is_empty() {
        ui.spacer();
        ui.block("Output", &rendered.html());
    }
}

fn print_explain_text(ui: &Ui, explain: &Explain) {
    ui.section("Explain", [("status", format!("{:?}", explain.status))]);
    if let Some(sql) = &explain.sql {
        ui.block("Query", sql);
    }
    ui.list(
        "Arguments",
        explain
            .arguments
            .iter()
            .map(|arg| format!("{} = {} ({:?})", arg.field, arg.summary, arg.source)),
    );
    if let Some(pager) = &explain.pager {
        ui.section(
            "Pager",
            [
                ("kind", format!("{:?}", pager.kind)),
                ("page", pager.page.to_string()),
                ("offset", pager.offset.to_string()),
                (
                    "limit",
                    pager.limit.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
                ),
            ],
        );
    }
}

#[derive(Serialize)]
struct PluginRow {
    #[serde(rename = "type")]
    ty: HandlerType,
    id: String,
    title: String,
    defaults: viewkit::types::Options,
}

fn plugin_rows(registry: &PluginRegistry, only: Option<HandlerType>) -> Vec<PluginRow> {
    HandlerType::ALL
        .into_iter()
        .filter(|ty| only.map_or(true, |only| only == *ty))
        .flat_map(|ty| registry.descriptors(ty))
        .map(|descriptor| PluginRow {
            ty: descriptor.ty,
            id: descriptor.id.clone(),
            title: descriptor.title.clone(),
            defaults: descriptor.default_options.clone(),
        })
        .collect()
}
