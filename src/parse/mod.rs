use logos::Logos;
use thiserror::Error;

use crate::{
    builtins::BuiltinCommands,
    cmd::execution_plan::{CommandStage, PipelineSpec},
};

use self::token::{LexerError, Token};

pub mod token;
pub mod unescape;

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("syntax error near `|`")]
    EmptyStage,
    #[error("`&` is only allowed at the end of a command")]
    MisplacedBackground,
}

/// A shell word after quote removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    /// Any part of the word was quoted or escaped.
    pub quoted: bool,
}

impl Word {
    pub fn new(text: impl Into<String>, quoted: bool) -> Self {
        Self {
            text: text.into(),
            quoted,
        }
    }

    /// The text, if it can still act as an operator.
    pub fn unquoted(&self) -> Option<&str> {
        (!self.quoted).then_some(self.text.as_str())
    }

    fn is_operator(&self, op: &str) -> bool {
        self.unquoted() == Some(op)
    }
}

/// What one input line asks for.
#[derive(Debug)]
pub enum Line {
    Empty,
    Builtin {
        command: BuiltinCommands,
        args: Vec<String>,
    },
    Pipeline(PipelineSpec),
}

pub fn parse_line(line: &str) -> Result<Line, CommandParseError> {
    let words = split_words(line)?;

    if let Some(first) = words.first().filter(|w| !w.quoted) {
        if let Some(command) = BuiltinCommands::from_name(&first.text) {
            let args = words.into_iter().skip(1).map(|w| w.text).collect();
            return Ok(Line::Builtin { command, args });
        }
    }

    Ok(split_pipeline(words)?.map_or(Line::Empty, Line::Pipeline))
}

/// Splits a line into words. Fragments not separated by blanks join into
/// one word, so `a"b c"'d'` is the single word `ab cd`.
pub fn split_words(line: &str) -> Result<Vec<Word>, LexerError> {
    let mut lexer = Token::lexer(line);
    let mut words = Vec::new();
    let mut current = None::<Word>;

    while let Some(token) = lexer.next() {
        let token = token.map_err(|_| LexerError::classify(lexer.slice()))?;
        let quoted = token.is_quoted();

        let fragment = match token {
            Token::Blank => {
                words.extend(current.take());
                continue;
            }
            Token::Bare(seg) => seg.to_owned(),
            Token::Escaped(seg) | Token::DoubleQuoted(seg) | Token::SingleQuoted(seg) => seg,
        };

        let word = current.get_or_insert_with(|| Word {
            text: String::new(),
            quoted: false,
        });
        word.text.push_str(&fragment);
        word.quoted |= quoted;
    }
    words.extend(current);

    Ok(words)
}

/// Groups words into stages on `|` and strips a trailing `&`. `None` for a
/// line with no words.
pub fn split_pipeline(mut words: Vec<Word>) -> Result<Option<PipelineSpec>, CommandParseError> {
    if words.is_empty() {
        return Ok(None);
    }

    let foreground = match words.iter().position(|w| w.is_operator("&")) {
        None => true,
        Some(index) if index + 1 == words.len() => {
            words.pop();
            false
        }
        Some(_) => return Err(CommandParseError::MisplacedBackground),
    };

    let mut stages = Vec::new();
    let mut current = Vec::new();
    for word in words {
        if word.is_operator("|") {
            stages.push(complete(&mut current)?);
        } else {
            current.push(word);
        }
    }
    stages.push(complete(&mut current)?);

    Ok(Some(PipelineSpec { stages, foreground }))
}

fn complete(words: &mut Vec<Word>) -> Result<CommandStage, CommandParseError> {
    if words.is_empty() {
        return Err(CommandParseError::EmptyStage);
    }
    Ok(CommandStage::new(std::mem::take(words)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &str) -> Vec<String> {
        split_words(line)
            .unwrap()
            .into_iter()
            .map(|w| w.text)
            .collect()
    }

    fn pipeline(line: &str) -> PipelineSpec {
        match parse_line(line).unwrap() {
            Line::Pipeline(spec) => spec,
            other => panic!("not a pipeline: {other:?}"),
        }
    }

    fn stage_words(spec: &PipelineSpec) -> Vec<Vec<&str>> {
        spec.stages
            .iter()
            .map(|s| s.words.iter().map(|w| w.text.as_str()).collect())
            .collect()
    }

    #[test]
    fn quoting_groups_whitespace() {
        assert_eq!(texts("echo  'a  b' \"c d\""), vec!["echo", "a  b", "c d"]);
        assert_eq!(texts(r#"a"b c"'d'"#), vec!["ab cd"]);
        assert_eq!(texts(r"one\ two"), vec!["one two"]);
        assert_eq!(texts("echo '' x"), vec!["echo", "", "x"]);
    }

    #[test]
    fn no_expansion() {
        assert_eq!(texts("echo $HOME *.rs ~"), vec!["echo", "$HOME", "*.rs", "~"]);
    }

    #[test]
    fn lexer_errors() {
        assert_eq!(split_words("echo 'oops"), Err(LexerError::UnterminatedString));
        assert_eq!(split_words("echo \"oops"), Err(LexerError::UnterminatedString));
        assert_eq!(split_words("echo oops\\"), Err(LexerError::DanglingEscape));
    }

    #[test]
    fn splits_stages() {
        let spec = pipeline("echo hello | cat");
        assert!(spec.foreground);
        assert_eq!(stage_words(&spec), vec![vec!["echo", "hello"], vec!["cat"]]);
    }

    #[test]
    fn pipe_must_stand_alone() {
        let spec = pipeline("echo a|b");
        assert_eq!(stage_words(&spec), vec![vec!["echo", "a|b"]]);
    }

    #[test]
    fn trailing_ampersand_means_background() {
        let spec = pipeline("sleep 5 &");
        assert!(!spec.foreground);
        assert_eq!(stage_words(&spec), vec![vec!["sleep", "5"]]);
    }

    #[test]
    fn quoted_operators_are_arguments() {
        let spec = pipeline("echo '|' \"&\" \\&");
        assert!(spec.foreground);
        assert_eq!(stage_words(&spec), vec![vec!["echo", "|", "&", "&"]]);

        let spec = pipeline("echo '>' x");
        let quoted: Vec<bool> = spec.stages[0].words.iter().map(|w| w.quoted).collect();
        assert_eq!(quoted, vec![false, true, false]);
    }

    #[test]
    fn redirections_stay_in_the_stage() {
        let spec = pipeline("cat < in.txt | wc -l > out.txt");
        assert_eq!(
            stage_words(&spec),
            vec![vec!["cat", "<", "in.txt"], vec!["wc", "-l", ">", "out.txt"]]
        );
    }

    #[test]
    fn empty_stages_are_errors() {
        for line in ["| cat", "echo |", "echo | | cat", "echo a | &"] {
            assert!(
                matches!(parse_line(line), Err(CommandParseError::EmptyStage)),
                "{line}"
            );
        }
    }

    #[test]
    fn ampersand_must_be_last() {
        assert!(matches!(
            parse_line("sleep 1 & echo"),
            Err(CommandParseError::MisplacedBackground)
        ));
    }

    #[test]
    fn blank_line_is_a_no_op() {
        assert!(matches!(parse_line(""), Ok(Line::Empty)));
        assert!(matches!(parse_line("   \t "), Ok(Line::Empty)));
    }

    #[test]
    fn builtins_take_the_rest_of_the_line() {
        match parse_line("fg 1234").unwrap() {
            Line::Builtin { command, args } => {
                assert!(matches!(command, BuiltinCommands::Fg(_)));
                assert_eq!(args, vec!["1234"]);
            }
            other => panic!("not a builtin: {other:?}"),
        }

        // quoting the name runs whatever is on PATH instead
        assert!(matches!(parse_line("'jobs'"), Ok(Line::Pipeline(_))));
    }
}
