//! Command line handling for chat and whisper-style commands.

/// Prefix of a regular command.
pub const COMMAND_SPECIFIER: &str = "/";

/// Prefix of a command whose invocation is not echoed to others.
pub const SILENT_SPECIFIER: &str = ".";

/// Commands whose argument text is scored like chat.
pub const WHISPER_COMMANDS: &[&str] = &["me", "r", "reply", "tell", "w", "whisper"];

/// True if chat text is really a command invocation.
pub fn is_command(text: &str) -> bool {
    text.starts_with(COMMAND_SPECIFIER) || text.starts_with(SILENT_SPECIFIER)
}

pub fn is_whisper_command(name: &str) -> bool {
    WHISPER_COMMANDS
        .iter()
        .any(|cmd| cmd.eq_ignore_ascii_case(name))
}

/// Text after the command name, including the separating whitespace.
///
/// `command_text` is the command line with or without its specifier,
/// so `"w Alice hi"` and `"/w Alice hi"` both yield `" Alice hi"`. If the line
/// does not start with `command_name` it is returned unchanged.
pub fn argument_text<'a>(command_text: &'a str, command_name: &str) -> &'a str {
    let line = command_text
        .strip_prefix(COMMAND_SPECIFIER)
        .or_else(|| command_text.strip_prefix(SILENT_SPECIFIER))
        .unwrap_or(command_text);

    match line.get(..command_name.len()) {
        Some(head) if head.eq_ignore_ascii_case(command_name) => &line[command_name.len()..],
        _ => line,
    }
}
