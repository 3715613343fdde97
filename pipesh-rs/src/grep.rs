//! `grep` builtin: regex line filter with case folding, whole-word matching
//! and trailing context.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use clap::error::ErrorKind;
use clap::Parser;
use regex::{Regex, RegexBuilder};

use crate::builtins::{report, OUTPUT_CLOSED};
use crate::stream::Streams;

#[derive(Parser, Debug)]
#[command(name = "grep", about = "grep utility", disable_version_flag = true)]
struct GrepArgs {
    /// Pattern to search for
    pattern: String,
    /// Files to search in ("-" or none reads standard input)
    files: Vec<String>,
    /// Ignore case distinctions
    #[arg(short = 'i', long = "ignore-case")]
    ignore_case: bool,
    /// Select only lines whose match forms a whole word
    #[arg(short = 'w', long = "word-regexp")]
    word_regexp: bool,
    /// Print NUM lines of trailing context
    #[arg(short = 'A', long = "after-context", value_name = "NUM", default_value_t = 0)]
    after_context: usize,
}

pub(crate) fn run_grep(args: &[String], io: &mut Streams) -> i32 {
    let opts = match GrepArgs::try_parse_from(std::iter::once("grep").chain(args.iter().map(String::as_str))) {
        Ok(o) => o,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            let _ = write!(io.output, "{}", e.render());
            return 0;
        }
        Err(e) => {
            let _ = write!(io.error, "{}", e.render());
            return 2;
        }
    };
    let re = match build_regex(&opts) {
        Ok(re) => re,
        Err(e) => { report(io, "grep", format_args!("invalid regex: {e}")); return 2; }
    };
    let files = if opts.files.is_empty() { vec!["-".to_string()] } else { opts.files.clone() };

    // 1 = nothing matched yet; an unreadable file sets 2, a later match resets to 0
    let mut code = 1;
    for file in &files {
        let scanned = if file == "-" {
            let Streams { input, output, .. } = &mut *io;
            scan(&mut BufReader::new(input), output, &re, opts.after_context)
        } else {
            match File::open(file) {
                Ok(f) => scan(&mut BufReader::new(f), &mut io.output, &re, opts.after_context),
                Err(_) => { report(io, "grep", format_args!("{file}: No such file or directory")); code = 2; continue; }
            }
        };
        match scanned {
            Ok(true) => code = 0,
            Ok(false) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return OUTPUT_CLOSED,
            Err(e) => { report(io, "grep", e); code = 2; }
        }
    }
    code
}

fn build_regex(opts: &GrepArgs) -> Result<Regex, regex::Error> {
    let pattern = if opts.word_regexp { format!(r"\b(?:{})\b", opts.pattern) } else { opts.pattern.clone() };
    RegexBuilder::new(&pattern).case_insensitive(opts.ignore_case).build()
}

/// Prints matching lines plus `after` lines of context; a new match restarts
/// the context window. Returns whether anything matched.
fn scan<R: BufRead, W: Write + ?Sized>(r: &mut R, out: &mut W, re: &Regex, after: usize) -> io::Result<bool> {
    let mut matched = false;
    let mut remaining = 0usize;
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if r.read_until(b'\n', &mut raw)? == 0 { break; }
        if raw.last() == Some(&b'\n') { raw.pop(); }
        if raw.last() == Some(&b'\r') { raw.pop(); }
        let line = String::from_utf8_lossy(&raw);
        let hit = re.is_match(&line);
        if hit { matched = true; remaining = after; }
        if hit || remaining > 0 {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
            if !hit { remaining -= 1; }
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Input, Output};

    fn grep(args: &[&str], input: &str) -> (i32, String, String) {
        let (out, out_buf) = Output::buffer();
        let (err, err_buf) = Output::buffer();
        let mut io = Streams::new(Input::from_bytes(input), out, err);
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let code = run_grep(&args, &mut io);
        (code, out_buf.to_string_lossy(), err_buf.to_string_lossy())
    }

    #[test]
    fn simple_match_and_miss() {
        assert_eq!(grep(&["banana"], "apple\nbanana\ncherry\n"), (0, "banana\n".into(), String::new()));
        assert_eq!(grep(&["banana"], "apple\ncherry\n").0, 1);
    }

    #[test]
    fn ignore_case_and_whole_words() {
        assert_eq!(grep(&["-i", "banana"], "Apple\nBANANA\n").1, "BANANA\n");
        assert_eq!(grep(&["-w", "apple"], "apple pie\npineapple\napple\n").1, "apple pie\napple\n");
        assert_eq!(grep(&["-w", "apple"], "pineapple\n").0, 1);
    }

    #[test]
    fn trailing_context_merges() {
        assert_eq!(grep(&["-A", "1", "match"], "1\n2\nmatch\n3\n4\n").1, "match\n3\n");
        assert_eq!(grep(&["-A", "1", "match"], "match1\nmatch2\nend\nmore\n").1, "match1\nmatch2\nend\n");
    }

    #[test]
    fn anchors_and_crlf() {
        assert_eq!(grep(&["^apple"], "apple\ncrabapple\napple pie\n").1, "apple\napple pie\n");
        assert_eq!(grep(&["apple$"], "apple\r\ncrabapple\napple pie\n").1, "apple\ncrabapple\n");
    }

    #[test]
    fn bad_regex_and_missing_pattern_are_usage_errors() {
        let (code, _, err) = grep(&["["], "");
        assert_eq!(code, 2);
        assert!(err.starts_with("grep: invalid regex"));
        let (code, _, err) = grep(&[], "");
        assert_eq!(code, 2);
        assert!(!err.is_empty());
    }

    #[test]
    fn help_goes_to_output() {
        let (code, out, _) = grep(&["--help"], "");
        assert_eq!(code, 0);
        assert!(out.contains("PATTERN") || out.contains("pattern"));
    }

    #[test]
    fn missing_file_is_reported() {
        let (code, _, err) = grep(&["x", "/definitely/not/here"], "");
        assert_eq!(code, 2);
        assert_eq!(err, "grep: /definitely/not/here: No such file or directory\n");
    }
}
