//! Phase classification.
//!
//! Pure mapping from a tool invocation (or a run boundary event) to one of the
//! five ordered phases. First matching rule wins.

use tracelens_protocol::{EventType, Phase, ToolInput};

pub const FILE_EDIT_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];
pub const EXPLORE_TOOLS: &[&str] = &["Read", "Glob", "Grep"];
pub const SHELL_TOOLS: &[&str] = &["Bash", "Shell"];

/// Programs that are test or lint runners on their own.
const VERIFY_PROGRAMS: &[&str] = &[
    "pytest", "jest", "vitest", "mocha", "rspec", "phpunit", "tox", "eslint",
];

/// Task runners whose subcommand decides whether a command verifies.
const TASK_RUNNERS: &[&str] = &[
    "npm", "npx", "yarn", "pnpm", "bun", "bunx", "make", "cargo", "go", "python", "python3", "uv",
    "poetry",
];

/// Subcommands or scripts of a task runner that run tests, lint, or a build.
const VERIFY_TASKS: &[&str] = &[
    "test", "t", "nextest", "unittest", "lint", "build", "pytest", "jest", "vitest", "mocha",
    "eslint", "tox",
];

/// Commands that only list or inspect the workspace.
const INSPECT_COMMANDS: &[&str] = &["ls", "pwd", "find"];

pub fn classify(tool_name: &str, input: &ToolInput) -> Phase {
    let tool_name = tool_name.trim();
    if FILE_EDIT_TOOLS.contains(&tool_name) {
        Phase::Implement
    } else if EXPLORE_TOOLS.contains(&tool_name) {
        Phase::Explore
    } else if SHELL_TOOLS.contains(&tool_name) {
        classify_command(input.command().unwrap_or_default())
    } else {
        Phase::Explore
    }
}

pub fn classify_command(command: &str) -> Phase {
    if is_verification_command(command) {
        Phase::Verify
    } else if is_inspection_command(command) {
        Phase::Explore
    } else {
        Phase::Implement
    }
}

/// Phase for synthetic boundary nodes.
pub fn lifecycle_phase(event_type: &EventType) -> Option<Phase> {
    match event_type {
        EventType::RunStarted => Some(Phase::Understand),
        EventType::RunCompleted | EventType::RunFailed => Some(Phase::Deliver),
        _ => None,
    }
}

/// Whether any `;`/`&&`/`|` segment of the command runs tests, lint, or a
/// build. Words are matched whole, so `cat jest.config.js` or `mkdir build`
/// do not count.
pub fn is_verification_command(command: &str) -> bool {
    let command = command.to_lowercase();
    command
        .split(|c| matches!(c, ';' | '&' | '|'))
        .any(|segment| segment_verifies(&command_words(segment)))
}

fn segment_verifies(words: &[&str]) -> bool {
    let Some((program, rest)) = words.split_first() else {
        return false;
    };
    if VERIFY_PROGRAMS.contains(program) {
        return true;
    }
    TASK_RUNNERS.contains(program)
        && rest
            .iter()
            .flat_map(|word| word.split(':'))
            .any(|task| VERIFY_TASKS.contains(&task))
}

/// Words of one shell segment with leading `KEY=value` assignments dropped
/// and paths reduced to their last component.
fn command_words(segment: &str) -> Vec<&str> {
    segment
        .split_whitespace()
        .map(|word| word.trim_matches(|c| c == '(' || c == ')'))
        .filter(|word| !word.is_empty())
        .skip_while(|word| word.contains('=') && !word.starts_with('-'))
        .map(|word| word.rsplit('/').next().unwrap_or(word))
        .collect()
}

pub fn is_inspection_command(command: &str) -> bool {
    let command = command.trim().to_lowercase();
    INSPECT_COMMANDS.iter().any(|prefix| {
        command
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })
}
