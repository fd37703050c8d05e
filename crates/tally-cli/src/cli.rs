use clap::{Args, Parser, Subcommand};
use tally_core::models::{Frequency, TaskPriority};
use tally_core::projection::TaskFilter;

/// Checklists for game characters that reset daily, weekly (Wednesday) and monthly, all in UTC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage the character roster
    #[command(alias = "char")]
    Character(CharacterCommand),
    /// Add a new task for a character
    Add(AddCommand),
    /// List tasks
    #[command(alias = "ls")]
    List(ListCommand),
    /// Mark a task as completed
    Done(DoneCommand),
    /// Mark a task as not completed
    Undo(UndoCommand),
    /// Edit a task
    Edit(EditCommand),
    /// Delete a task
    Delete(DeleteCommand),
    /// Clear completions whose reset has passed
    Reconcile(ReconcileCommand),
    /// Keep reconciling in the foreground until interrupted
    Watch(WatchCommand),
    /// Show upcoming reset times
    Resets(ResetsCommand),
    /// Manage presets of optional tasks
    Preset(PresetCommand),
    /// Enable an optional task for a character
    Enable(ToggleTaskCommand),
    /// Disable an optional task for a character
    Disable(ToggleTaskCommand),
    /// Create tasks from the configured templates
    Seed(SeedCommand),
    /// Collapse/expand state of list sections
    View(ViewCommand),
    /// Write every stored key to a JSON file
    Export(ExportCommand),
    /// Replace all stored state with an exported JSON file
    Import(ImportCommand),
    /// Estimate how many resets it takes to reach a target
    Calc(CalcCommand),
}

#[derive(Args, Debug, Clone)]
pub struct CharacterCommand {
    #[command(subcommand)]
    pub command: CharacterSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CharacterSubcommand {
    /// Add a character
    Add(AddCharacterCommand),
    /// List the roster in display order
    List,
    /// Edit a character; renaming moves its tasks along
    Edit(EditCharacterCommand),
    /// Remove a character. Its tasks stay stored but are no longer shown
    Remove(RemoveCharacterCommand),
    /// Make a character the main one
    Main(CharacterRef),
    /// Hide a character's tasks from the unfinished list
    Hide(CharacterRef),
    /// Show a hidden character again
    Unhide(CharacterRef),
    /// Set the display order
    Order(OrderCommand),
}

#[derive(Args, Debug, Clone)]
pub struct AddCharacterCommand {
    /// The name of the character
    pub name: String,
    #[arg(long)]
    pub level: Option<u32>,
    #[arg(long)]
    pub exp: Option<u64>,
    /// Make this the main character
    #[arg(long)]
    pub main: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditCharacterCommand {
    /// Character id or name
    pub character: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub level: Option<u32>,
    #[arg(long)]
    pub exp: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveCharacterCommand {
    /// Character id or name
    pub character: String,
    /// Remove without confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CharacterRef {
    /// Character id or name
    pub character: String,
}

#[derive(Args, Debug, Clone)]
pub struct OrderCommand {
    /// Character names, first shown first
    #[arg(required = true, num_args = 1..)]
    pub names: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddCommand {
    /// The character the task belongs to
    pub character: String,
    /// The name of the task
    pub name: String,
    /// How often the task resets
    #[arg(short = 'e', long, default_value = "daily")]
    pub every: Frequency,
    #[arg(short, long, default_value = "")]
    pub category: String,
    /// Due date, e.g. "next wednesday" or "2024-03-06"
    #[arg(short, long)]
    pub due: Option<String>,
    #[arg(short, long)]
    pub priority: Option<TaskPriority>,
    #[arg(short, long)]
    pub note: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListCommand {
    /// all, finished, unfinished or hidden
    #[arg(short, long)]
    pub filter: Option<TaskFilter>,
    /// Only this character's tasks
    #[arg(short, long)]
    pub character: Option<String>,
    /// Also list tasks whose character is no longer in the roster
    #[arg(long)]
    pub orphans: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DoneCommand {
    /// The ID (or unique prefix) of the task
    pub id: String,
    /// When it was completed, e.g. "yesterday 22:00"
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UndoCommand {
    /// The ID (or unique prefix) of the task
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditCommand {
    /// The ID (or unique prefix) of the task
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub character: Option<String>,

    #[arg(long)]
    pub every: Option<Frequency>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub due: Option<String>,
    #[arg(long, conflicts_with = "due")]
    pub due_clear: bool,

    #[arg(long)]
    pub priority: Option<TaskPriority>,
    #[arg(long, conflicts_with = "priority")]
    pub priority_clear: bool,

    #[arg(long)]
    pub note: Option<String>,
    #[arg(long, conflicts_with = "note")]
    pub note_clear: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteCommand {
    /// The ID (or unique prefix) of the task
    pub id: String,
    /// Force deletion without confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileCommand {
    /// Reconcile as if it were this time, e.g. "next wednesday"
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchCommand {
    /// Tick interval in milliseconds (defaults to the configured one)
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ResetsCommand {
    /// Show resets as seen from this time
    #[arg(long)]
    pub at: Option<String>,
    /// Display timezone (defaults to the configured one)
    #[arg(long)]
    pub timezone: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PresetCommand {
    #[command(subcommand)]
    pub command: PresetSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PresetSubcommand {
    /// Save a character's enabled tasks as a preset
    Save(SavePresetCommand),
    /// Apply a preset to one character or the whole roster
    Apply(ApplyPresetCommand),
    /// List presets
    List,
    /// Delete a preset
    Delete(DeletePresetCommand),
}

#[derive(Args, Debug, Clone)]
pub struct SavePresetCommand {
    pub name: String,
    /// Character whose enabled tasks are copied
    #[arg(long)]
    pub from: String,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyPresetCommand {
    pub name: String,
    /// Apply to this character only
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    pub character: Option<String>,
    /// Apply to every character in the roster
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeletePresetCommand {
    pub name: String,
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ToggleTaskCommand {
    /// Character id or name
    pub character: String,
    /// Template name, e.g. "Guild raid"
    pub task: String,
}

#[derive(Args, Debug, Clone)]
pub struct SeedCommand {
    /// Only seed this character
    #[arg(long)]
    pub character: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ViewCommand {
    #[command(subcommand)]
    pub command: ViewSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ViewSubcommand {
    /// Print the stored view state
    Show,
    /// Collapse or expand a section
    Section { name: String },
    /// Expand or shrink a list
    List { name: String },
}

#[derive(Args, Debug, Clone)]
pub struct ExportCommand {
    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<std::path::PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportCommand {
    pub file: std::path::PathBuf,
    /// Replace without confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CalcCommand {
    #[arg(long, default_value_t = 0)]
    pub current: u64,
    #[arg(long)]
    pub target: u64,
    #[arg(long, default_value_t = 0)]
    pub daily: u64,
    #[arg(long, default_value_t = 0)]
    pub weekly: u64,
    #[arg(long, default_value_t = 0)]
    pub monthly: u64,
}
