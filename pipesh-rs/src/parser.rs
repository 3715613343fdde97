use crate::env::Assignments;
use crate::error::ParseError;
use crate::lexer::Token;

/// One stage of a pipeline: `NAME=value… name args…`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub assignments: Assignments,
    /// Empty for an assignment-only stage.
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn is_assignment_only(&self) -> bool { self.name.is_empty() }
}

/// Stages in order; never empty when produced by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline { pub stages: Vec<ParsedCommand> }

impl Pipeline {
    /// The assignments of a line like `A=1 B=2` with no command and no pipe.
    pub fn assignment_only(&self) -> Option<&Assignments> {
        match self.stages.as_slice() {
            [only] if only.is_assignment_only() => Some(&only.assignments),
            _ => None,
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    is_identifier(name).then_some((name, value))
}

/// Builds the pipeline for one line. `Ok(None)` means there was nothing to run.
pub fn parse(tokens: &[Token]) -> Result<Option<Pipeline>, ParseError> {
    if tokens.is_empty() { return Ok(None); }
    let mut stages = Vec::new();
    for (i, segment) in tokens.split(|t| *t == Token::Pipe).enumerate() {
        if segment.is_empty() {
            return Err(if i == 0 { ParseError::EmptyStageBefore } else { ParseError::EmptyStageAfter });
        }
        stages.push(parse_stage(segment));
    }
    Ok(Some(Pipeline { stages }))
}

fn parse_stage(segment: &[Token]) -> ParsedCommand {
    let mut cmd = ParsedCommand::default();
    let mut words = segment.iter().filter_map(|t| match t { Token::Word(w) => Some(w), Token::Pipe => None });
    for word in words.by_ref() {
        match assignment(word) {
            // later duplicates win
            Some((name, value)) => { cmd.assignments.insert(name.to_string(), value.to_string()); }
            None => { cmd.name = word.clone(); break; }
        }
    }
    cmd.args = words.cloned().collect();
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_line(line: &str) -> Result<Option<Pipeline>, ParseError> { parse(&tokenize(line)?) }

    #[test]
    fn empty_line_is_nothing() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn command_with_args() {
        let p = parse_line("grep -i foo file.txt").unwrap().unwrap();
        assert_eq!(p.stages.len(), 1);
        assert_eq!(p.stages[0].name, "grep");
        assert_eq!(p.stages[0].args, ["-i", "foo", "file.txt"]);
        assert!(p.stages[0].assignments.is_empty());
    }

    #[test]
    fn leading_assignments_only() {
        let p = parse_line("A=1 B=x=y A=2 env C=3").unwrap().unwrap();
        let s = &p.stages[0];
        assert_eq!(s.assignments.get("A").map(String::as_str), Some("2"));
        assert_eq!(s.assignments.get("B").map(String::as_str), Some("x=y"));
        assert_eq!(s.name, "env");
        assert_eq!(s.args, ["C=3"]);
    }

    #[test]
    fn invalid_identifier_is_the_command() {
        let p = parse_line("1A=2 echo").unwrap().unwrap();
        assert_eq!(p.stages[0].name, "1A=2");
        assert!(p.stages[0].assignments.is_empty());
    }

    #[test]
    fn assignment_only_line() {
        let p = parse_line("FOO=bar").unwrap().unwrap();
        assert_eq!(p.assignment_only().and_then(|a| a.get("FOO")).map(String::as_str), Some("bar"));
        assert!(parse_line("FOO=bar | cat").unwrap().unwrap().assignment_only().is_none());
    }

    #[test]
    fn pipes_split_stages() {
        let p = parse_line("echo a | X=1 wc | cat").unwrap().unwrap();
        let names: Vec<_> = p.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["echo", "wc", "cat"]);
        assert_eq!(p.stages[1].assignments.get("X").map(String::as_str), Some("1"));
    }

    #[test]
    fn empty_stages_are_errors() {
        assert_eq!(parse_line("| wc"), Err(ParseError::EmptyStageBefore));
        assert_eq!(parse_line("echo |"), Err(ParseError::EmptyStageAfter));
        assert_eq!(parse_line("echo || wc"), Err(ParseError::EmptyStageAfter));
        // a quoted pipe is an ordinary word
        assert_eq!(parse_line("echo '|'").unwrap().unwrap().stages[0].args, ["|"]);
    }
}
