use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "specsheet",
    version,
    about = "Transfer technical data sheet fields into product cards"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract every data sheet of a directory into CSV/JSON files.
    Extract(ExtractArgs),
    /// Extract data sheets and save the resulting cards into the card store.
    Import(ImportArgs),
    /// Enter each data sheet into the card form and regenerate its document.
    Fill(FillArgs),
    Status(StatusArgs),
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = InputFormat::Pdf)]
    pub input_format: InputFormat,

    #[arg(long, default_value = ".cache/specsheet")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub prepared_by: String,

    /// Supplementary spreadsheet (xlsx, xls, ods or a CSV export); enrichment is
    /// off without it.
    #[arg(long, alias = "lookup-csv")]
    pub lookup_table: Option<PathBuf>,

    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CaptureMode::Auto)]
    pub capture_mode: CaptureMode,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,

    /// Date printed on the cards; defaults to today.
    #[arg(long)]
    pub issue_date: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum InputFormat {
    Pdf,
    Text,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum CaptureMode {
    FirstNumber,
    WithTolerance,
    #[default]
    Auto,
}

impl CaptureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstNumber => "first-number",
            Self::WithTolerance => "with-tolerance",
            Self::Auto => "auto",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Excel,
    Json,
    All,
}

impl ExportFormat {
    pub fn includes_csv(self) -> bool {
        matches!(self, Self::Csv | Self::All)
    }

    pub fn includes_excel(self) -> bool {
        matches!(self, Self::Excel | Self::All)
    }

    pub fn includes_json(self) -> bool {
        matches!(self, Self::Json | Self::All)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[arg(long, value_enum, default_value_t = ExportFormat::All)]
    pub format: ExportFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FillArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// State file the form application loads its widgets from.
    #[arg(long)]
    pub form_state: PathBuf,

    #[arg(long)]
    pub form_template: Option<PathBuf>,

    /// Command producing the card PDF, e.g. `cardgen --load {form} --pdf {output}`.
    #[arg(long)]
    pub regenerate_command: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/specsheet")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(long, default_value = ".cache/specsheet")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub card_no: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
