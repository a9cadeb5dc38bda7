//! Line command processor: turns one line of text into at most one library call.
//!
//! Grammars are tried longest pattern first; grammars of the same length are
//! tried in the order they were declared. A grammar matches only when every
//! input token is consumed. The first match wins, there is no backtracking
//! into other grammars even if its builder rejects the arguments.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::common::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tok {
  /// Exactly this text.
  Lit(&'static str),
  /// One of these texts; the matched one is captured.
  OneOf(&'static [&'static str]),
  /// Any single token, captured.
  Word,
  /// An unsigned decimal integer, captured.
  Uint,
  /// Everything up to the end of the line (at least one token), captured as typed.
  /// A single remaining token is captured like `Word`, without its quotes.
  Rest,
}

/// Captured values of a matched line, in pattern order. Literals are not captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
  values: Vec<String>,
}

impl Args {
  pub fn len(&self) -> usize {
    self.values.len()
  }
  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
  pub fn get(&self, index: usize) -> Option<&str> {
    self.values.get(index).map(String::as_str)
  }
  pub fn word(&self, index: usize) -> Result<&str, String> {
    self.get(index).ok_or_else(|| format!("missing argument {}", index + 1))
  }
  pub fn number<T: FromStr>(&self, index: usize) -> Result<T, String> {
    let text = self.word(index)?;
    text.parse().map_err(|_| format!("'{text}' is out of range"))
  }
}

/// The outcome of processing one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<Op> {
  Nothing,
  /// Allocate a tracker slot described by `description`, then issue `operation`.
  Issue { description: String, operation: Op },
  /// Print usage, for one family or for everything.
  Help(Option<char>),
  /// A grammar matched but the arguments were invalid.
  Reject { family: char, reason: String },
  /// No grammar matched.
  Unrecognized(String),
  Quit,
  ListRequests,
}

pub type Builder<Op> = fn(&Args) -> Result<Action<Op>, String>;

pub struct Grammar<Op> {
  pub family: char,
  pub pattern: &'static [Tok],
  pub usage: &'static str,
  pub build: Builder<Op>,
}

impl<Op> Grammar<Op> {
  pub fn new(family: char, pattern: &'static [Tok], usage: &'static str, build: Builder<Op>) -> Self {
    Self { family, pattern, usage, build }
  }

  fn matches(&self, line: &str, tokens: &[Token]) -> Option<Args> {
    let mut values = vec![];
    let mut rest_taken = false;
    for (i, tok) in self.pattern.iter().enumerate() {
      let token = tokens.get(i)?;
      match tok {
        Tok::Lit(lit) => {
          if token.text != *lit {
            return None;
          }
        }
        Tok::OneOf(set) => {
          if !set.contains(&token.text.as_str()) {
            return None;
          }
          values.push(token.text.clone());
        }
        Tok::Word => values.push(token.text.clone()),
        Tok::Uint => {
          if token.text.is_empty() || !token.text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
          }
          values.push(token.text.clone());
        }
        Tok::Rest => {
          let text = if tokens.len() == i + 1 { token.text.clone() } else { line[token.start..].trim_end().to_owned() };
          values.push(text);
          rest_taken = true;
          break;
        }
      }
    }
    if !rest_taken && tokens.len() != self.pattern.len() {
      return None;
    }
    Some(Args { values })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
  text: String,
  start: usize,
}

/// Splits on whitespace; a double-quoted run is one token without the quotes.
fn tokenize(line: &str) -> Vec<Token> {
  let mut tokens = vec![];
  let mut chars = line.char_indices().peekable();
  while let Some(&(start, c)) = chars.peek() {
    if c.is_whitespace() {
      chars.next();
      continue;
    }
    let mut text = String::new();
    if c == '"' {
      chars.next();
      for (_, c) in chars.by_ref() {
        if c == '"' {
          break;
        }
        text.push(c);
      }
    } else {
      while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() {
          break;
        }
        text.push(c);
        chars.next();
      }
    }
    tokens.push(Token { text, start });
  }
  tokens
}

pub struct CommandProcessor<Op> {
  /// Declaration order, used for usage listings.
  grammars: Vec<Grammar<Op>>,
  /// Indices into `grammars` in matching order.
  order: Vec<usize>,
}

impl<Op> CommandProcessor<Op> {
  pub fn new(grammars: Vec<Grammar<Op>>) -> Self {
    let mut order = (0..grammars.len()).collect::<Vec<_>>();
    // stable, so equal lengths keep declaration order
    order.sort_by_key(|&i| std::cmp::Reverse(grammars[i].pattern.len()));
    Self { grammars, order }
  }

  /// `grammars` followed by the built-in help, list-requests and quit commands.
  pub fn with_builtins(mut grammars: Vec<Grammar<Op>>) -> Self {
    grammars.push(Grammar::new('R', &[Tok::Lit("R")], "R                         list pending requests", build_list_requests::<Op>));
    grammars.push(Grammar::new('?', &[Tok::Lit("?"), Tok::Word], "? CMD                     help for one command", build_help_for::<Op>));
    grammars.push(Grammar::new('?', &[Tok::Lit("?")], "?                         help", build_help::<Op>));
    grammars.push(Grammar::new('q', &[Tok::Lit("q")], "q                         quit", build_quit::<Op>));
    Self::new(grammars)
  }

  pub fn parse(&self, line: &str) -> Action<Op> {
    let tokens = tokenize(line);
    if tokens.is_empty() {
      return Action::Nothing;
    }
    for &i in &self.order {
      let grammar = &self.grammars[i];
      if let Some(args) = grammar.matches(line, &tokens) {
        trace!("'{}' matched '{}'", line.trim(), grammar.usage);
        return match (grammar.build)(&args) {
          Ok(action) => action,
          Err(reason) => Action::Reject { family: grammar.family, reason },
        };
      }
    }
    Action::Unrecognized(line.trim().to_owned())
  }

  /// Usage lines of one family, or all of them, in declaration order. Grammars
  /// with an empty usage line are variants documented by a neighbour.
  pub fn usage(&self, family: Option<char>) -> String {
    let mut out = String::new();
    for g in self.grammars.iter().filter(|g| !g.usage.is_empty() && family.map_or(true, |f| g.family == f)) {
      let _ = writeln!(out, "  {}", g.usage);
    }
    out
  }
}

fn build_list_requests<Op>(_: &Args) -> Result<Action<Op>, String> {
  Ok(Action::ListRequests)
}

fn build_help<Op>(_: &Args) -> Result<Action<Op>, String> {
  Ok(Action::Help(None))
}

fn build_help_for<Op>(args: &Args) -> Result<Action<Op>, String> {
  let word = args.word(0)?;
  let mut chars = word.chars();
  match (chars.next(), chars.next()) {
    (Some(c), None) => Ok(Action::Help(Some(c))),
    _ => Err(format!("'{word}' is not a command letter")),
  }
}

fn build_quit<Op>(_: &Args) -> Result<Action<Op>, String> {
  Ok(Action::Quit)
}
