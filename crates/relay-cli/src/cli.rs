//! Interactive chat loop
//!
//! reedline で入力を読み取り、クエリごとに会話を進める

use std::borrow::Cow;

use nu_ansi_term::{Color, Style};
use reedline::{
    DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings, Prompt, PromptEditMode,
    PromptHistorySearch, Reedline, ReedlineEvent, Signal,
};
use tracing::{info, warn};

use relay_agent::Conversation;
use relay_core::LlmClient;
use relay_mcp::{ServerRegistry, ToolCatalog};

const PROMPT: &str = "Query: ";

/// Prompt with colored styling
struct QueryPrompt {
    style: Style,
}

impl QueryPrompt {
    fn new() -> Self {
        Self {
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for QueryPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(self.style.paint(PROMPT).to_string())
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
}

/// Read queries until the operator quits
///
/// Returns on `quit`, Ctrl-D, Ctrl-C at the prompt, or Ctrl-C while a query
/// is running. Server cleanup is left to the caller.
pub async fn chat_loop<C: LlmClient>(
    registry: &ServerRegistry,
    catalog: &ToolCatalog,
    mut conversation: Conversation<C>,
) -> anyhow::Result<()> {
    print_welcome();

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());
    let mut line_editor = Reedline::create()
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(default_keybindings())));
    let prompt = QueryPrompt::new();

    loop {
        match off_runtime(|| line_editor.read_line(&prompt)) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();

                if input.is_empty() {
                    continue;
                }
                if is_quit(input) {
                    break;
                }

                tokio::select! {
                    result = conversation.process_query(registry, catalog, input) => match result {
                        Ok(answer) => println!("\n{}\n", answer),
                        Err(e) => eprintln!("\nError: {}\n", e),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        warn!("Query interrupted");
                        println!("\nInterrupted.");
                        break;
                    }
                }
            }
            Ok(Signal::CtrlC) | Ok(Signal::CtrlD) => break,
            Err(err) => {
                eprintln!("\nError: {}\n", err);
                break;
            }
        }
    }

    info!(messages = conversation.history().len(), "Chat loop finished");
    Ok(())
}

/// Run blocking terminal input without stalling server I/O tasks
fn off_runtime<T>(read: impl FnOnce() -> T) -> T {
    tokio::task::block_in_place(read)
}

/// Whether the operator asked to leave
fn is_quit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("quit")
}

/// Keybindings for the query prompt
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

fn print_welcome() {
    println!();
    println!("mcp-relay started");
    println!("Type your queries or 'quit' to exit.");
    println!();
}
