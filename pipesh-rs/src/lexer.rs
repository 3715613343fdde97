use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    /// Unquoted `|`.
    Pipe,
}

/// Splits an (already expanded) line into words and pipe symbols.
///
/// Quotes group a word and are removed. Inside `'…'` everything is literal;
/// inside `"…"` a backslash only escapes `$`, `"`, `\` and backtick. Outside
/// quotes `\x` is a literal `x`.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    // distinguishes `''` (an empty word) from no word at all
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '|' => {
                finish(&mut tokens, &mut word, &mut in_word);
                tokens.push(Token::Pipe);
            }
            c if c.is_whitespace() => finish(&mut tokens, &mut word, &mut in_word),
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => word.push(ch),
                        None => return Err(ParseError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('$' | '"' | '\\' | '`')) => word.push(esc),
                            Some(other) => { word.push('\\'); word.push(other); }
                            None => return Err(ParseError::UnterminatedQuote('"')),
                        },
                        Some(ch) => word.push(ch),
                        None => return Err(ParseError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => match chars.next() {
                Some(ch) => { word.push(ch); in_word = true; }
                None => return Err(ParseError::TrailingBackslash),
            },
            _ => { word.push(c); in_word = true; }
        }
    }
    finish(&mut tokens, &mut word, &mut in_word);
    Ok(tokens)
}

fn finish(tokens: &mut Vec<Token>, word: &mut String, in_word: &mut bool) {
    if *in_word { tokens.push(Token::Word(std::mem::take(word))); *in_word = false; }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        tokenize(line).unwrap().into_iter().map(|t| match t { Token::Word(w) => w, Token::Pipe => "|".into() }).collect()
    }

    #[test]
    fn splits_on_whitespace_and_pipes() {
        assert_eq!(words("  echo   hello\tworld "), ["echo", "hello", "world"]);
        assert_eq!(tokenize("a|b").unwrap(), vec![Token::Word("a".into()), Token::Pipe, Token::Word("b".into())]);
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn quotes_group_and_are_stripped() {
        assert_eq!(words("echo 'hello world' \"a | b\""), ["echo", "hello world", "a | b"]);
        assert_eq!(words("pre'mid'\"post\""), ["premidpost"]);
        assert_eq!(words("echo '' x"), ["echo", "", "x"]);
    }

    #[test]
    fn backslash_rules() {
        assert_eq!(words(r"a\ b \|"), ["a b", "|"]);
        assert_eq!(words(r#""\$HOME \"q\" \\ \n""#), [r#"$HOME "q" \ \n"#]);
        assert_eq!(words(r"'\n'"), [r"\n"]);
    }

    #[test]
    fn errors() {
        assert_eq!(tokenize("echo 'oops"), Err(ParseError::UnterminatedQuote('\'')));
        assert_eq!(tokenize("echo \"oops"), Err(ParseError::UnterminatedQuote('"')));
        assert_eq!(tokenize("echo oops\\"), Err(ParseError::TrailingBackslash));
    }
}
