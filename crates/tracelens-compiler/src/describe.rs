//! Per-tool labels, signatures, and previews.
//!
//! Shared by the graph builder and the timeline folder so a tool call reads
//! the same in both views.

use tracelens_protocol::{Phase, ToolInput};

use crate::config::CompilerConfig;
use crate::phase::{self, FILE_EDIT_TOOLS, SHELL_TOOLS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescription {
    pub phase: Phase,
    /// Merge key: tool name plus primary argument.
    pub signature: String,
    pub label: String,
    pub subtitle: String,
    /// Path touched by file tools.
    pub file: Option<String>,
    /// Inline content preview for file-producing tools.
    pub preview: Option<String>,
}

impl ToolDescription {
    /// One-line human description used by the timeline.
    pub fn summary(&self) -> String {
        if self.subtitle.is_empty() || self.subtitle == self.label {
            self.label.clone()
        } else {
            format!("{} ({})", self.label, self.subtitle)
        }
    }
}

pub fn describe(tool_name: &str, input: &ToolInput, config: &CompilerConfig) -> ToolDescription {
    let phase = phase::classify(tool_name, input);
    let name = tool_name.trim();

    if name == "Read" || FILE_EDIT_TOOLS.contains(&name) {
        return describe_file_tool(name, input, phase, config);
    }
    if SHELL_TOOLS.contains(&name) {
        return describe_shell(name, input, phase, config);
    }

    let (label, subtitle, signature) = match name {
        "Glob" => (
            "Find files".to_owned(),
            input.pattern().unwrap_or_default().to_owned(),
            "Glob".to_owned(),
        ),
        "Grep" => (
            "Search code".to_owned(),
            input.pattern().unwrap_or_default().to_owned(),
            "Grep".to_owned(),
        ),
        "WebFetch" => {
            let url = input.url();
            let label = url
                .and_then(url_host)
                .map_or_else(|| "Fetch page".to_owned(), |host| format!("Fetch {host}"));
            (label, url.unwrap_or_default().to_owned(), signature_of(name, url))
        }
        "WebSearch" => {
            let query = input.query();
            (
                "Search web".to_owned(),
                query.unwrap_or_default().to_owned(),
                signature_of(name, query),
            )
        }
        "Task" => {
            let brief = input.description().or_else(|| input.prompt());
            (
                "Delegate task".to_owned(),
                brief.unwrap_or_default().to_owned(),
                signature_of(name, brief),
            )
        }
        "TodoWrite" => ("Update todos".to_owned(), String::new(), name.to_owned()),
        "" => ("Tool call".to_owned(), String::new(), "?".to_owned()),
        other => {
            let primary = input.generic_primary();
            (
                other.to_owned(),
                primary.unwrap_or_default().to_owned(),
                signature_of(other, primary),
            )
        }
    };

    ToolDescription {
        phase,
        signature,
        label,
        subtitle: clip(&subtitle, config.subtitle_chars),
        file: None,
        preview: None,
    }
}

fn describe_file_tool(
    name: &str,
    input: &ToolInput,
    phase: Phase,
    config: &CompilerConfig,
) -> ToolDescription {
    let path = input.file_path();
    let verb = match name {
        "MultiEdit" | "NotebookEdit" => "Edit",
        other => other,
    };
    let label = path.map_or_else(
        || format!("{verb} file"),
        |path| format!("{verb} {}", basename(path)),
    );
    let preview = match name {
        "Write" => input.content(),
        "Edit" => input.new_string(),
        "MultiEdit" => input.first_edit_new_string(),
        _ => None,
    }
    .map(|text| clip(text, config.preview_chars));

    ToolDescription {
        phase,
        signature: signature_of(name, path),
        label,
        subtitle: path.unwrap_or_default().to_owned(),
        file: path.map(str::to_owned),
        preview,
    }
}

fn describe_shell(
    name: &str,
    input: &ToolInput,
    phase: Phase,
    config: &CompilerConfig,
) -> ToolDescription {
    let command = input.command();
    let label = match command {
        None => "Run command".to_owned(),
        Some(cmd) if phase::is_verification_command(cmd) => "Run tests".to_owned(),
        Some(cmd) => clip(first_line(cmd), config.label_command_chars),
    };
    let subtitle = input
        .description()
        .or(command)
        .map(|text| clip(text, config.subtitle_chars))
        .unwrap_or_default();

    ToolDescription {
        phase,
        signature: signature_of(name, command),
        label,
        subtitle,
        file: None,
        preview: None,
    }
}

fn signature_of(tool_name: &str, primary: Option<&str>) -> String {
    match primary {
        Some(primary) => format!("{tool_name}:{primary}"),
        None => tool_name.to_owned(),
    }
}

pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
}

fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#'])
        .next()
        .filter(|host| !host.is_empty())
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default()
}

/// Cut `text` to at most `max_chars` characters, ending in an ellipsis when cut.
pub fn clip(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}
