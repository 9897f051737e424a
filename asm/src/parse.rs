// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Backtracking parser combinators.
//!
//! A parser is anything implementing [`Parser`], most often a closure from
//! the remaining input to a [`ParseResult`]. Nothing is memoized: [`either`]
//! and [`many`] re-run their parsers from the same input on every attempt,
//! which is fine for inputs the size of an assembly program.

/// Outcome of running a parser. Results are never modified in place; the
/// `map*` methods build new ones and leave failures untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<'a, T> {
    Parsed { value: T, unparsed: &'a str },
    Failed { unparsed: &'a str },
}

impl<'a, T> ParseResult<'a, T> {
    pub fn parsed(value: T, unparsed: &'a str) -> Self {
        Self::Parsed { value, unparsed }
    }

    pub fn failed(unparsed: &'a str) -> Self {
        Self::Failed { unparsed }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn unparsed(&self) -> &'a str {
        match self {
            Self::Parsed { unparsed, .. } | Self::Failed { unparsed } => unparsed,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Parsed { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Reshapes both the value and the remaining input of a success.
    pub fn map<U>(
        self,
        f: impl FnOnce(T, &'a str) -> (U, &'a str),
    ) -> ParseResult<'a, U> {
        match self {
            Self::Parsed { value, unparsed } => {
                let (value, unparsed) = f(value, unparsed);
                ParseResult::parsed(value, unparsed)
            }
            Self::Failed { unparsed } => ParseResult::failed(unparsed),
        }
    }

    pub fn map_parsed<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<'a, U> {
        self.map(|value, unparsed| (f(value), unparsed))
    }

    pub fn map_unparsed(self, f: impl FnOnce(&'a str) -> &'a str) -> Self {
        match self {
            Self::Parsed { value, unparsed } => Self::parsed(value, f(unparsed)),
            failed => failed,
        }
    }
}

pub trait Parser<'a, T> {
    fn parse(&self, input: &'a str) -> ParseResult<'a, T>;

    /// See [`ParseResult::map`].
    fn map<U, F>(self, f: F) -> impl Parser<'a, U>
    where
        Self: Sized,
        F: Fn(T, &'a str) -> (U, &'a str),
    {
        move |input: &'a str| self.parse(input).map(&f)
    }

    /// See [`ParseResult::map_parsed`].
    fn map_parsed<U, F>(self, f: F) -> impl Parser<'a, U>
    where
        Self: Sized,
        F: Fn(T) -> U,
    {
        move |input: &'a str| self.parse(input).map_parsed(&f)
    }

    /// See [`ParseResult::map_unparsed`].
    fn map_unparsed<F>(self, f: F) -> impl Parser<'a, T>
    where
        Self: Sized,
        F: Fn(&'a str) -> &'a str,
    {
        move |input: &'a str| self.parse(input).map_unparsed(&f)
    }
}

impl<'a, T, F> Parser<'a, T> for F
where
    F: Fn(&'a str) -> ParseResult<'a, T>,
{
    fn parse(&self, input: &'a str) -> ParseResult<'a, T> {
        self(input)
    }
}

/// Something that can match at the very start of an input.
pub trait Pattern {
    /// Length in bytes of the match at the start of `input`.
    fn match_len(&self, input: &str) -> Option<usize>;
}

impl Pattern for &str {
    fn match_len(&self, input: &str) -> Option<usize> {
        input.starts_with(*self).then_some(self.len())
    }
}

impl Pattern for char {
    fn match_len(&self, input: &str) -> Option<usize> {
        input.starts_with(*self).then_some(self.len_utf8())
    }
}

/// A fixed string, ignoring ASCII case.
#[derive(Debug, Clone, Copy)]
pub struct NoCase<'p>(&'p str);

pub fn no_case(text: &str) -> NoCase<'_> {
    NoCase(text)
}

impl Pattern for NoCase<'_> {
    fn match_len(&self, input: &str) -> Option<usize> {
        let candidate = input.get(..self.0.len())?;
        candidate.eq_ignore_ascii_case(self.0).then_some(self.0.len())
    }
}

/// Any of several spellings, ignoring ASCII case. The longest spelling that
/// matches wins.
#[derive(Debug, Clone, Copy)]
pub struct AnyNoCase<'p>(&'p [&'p str]);

pub fn any_no_case<'p>(spellings: &'p [&'p str]) -> AnyNoCase<'p> {
    AnyNoCase(spellings)
}

impl Pattern for AnyNoCase<'_> {
    fn match_len(&self, input: &str) -> Option<usize> {
        self.0
            .iter()
            .filter_map(|spelling| no_case(spelling).match_len(input))
            .max()
    }
}

/// One or more characters satisfying a predicate.
#[derive(Debug, Clone, Copy)]
pub struct TakeWhile1<F>(F);

pub fn take_while1<F: Fn(char) -> bool>(predicate: F) -> TakeWhile1<F> {
    TakeWhile1(predicate)
}

impl<F: Fn(char) -> bool> Pattern for TakeWhile1<F> {
    fn match_len(&self, input: &str) -> Option<usize> {
        let len = input
            .char_indices()
            .find(|&(_, c)| !(self.0)(c))
            .map_or(input.len(), |(index, _)| index);
        (len > 0).then_some(len)
    }
}

/// A marker character and the rest of its line, newline excluded.
#[derive(Debug, Clone, Copy)]
pub struct LineComment(char);

pub fn line_comment(marker: char) -> LineComment {
    LineComment(marker)
}

impl Pattern for LineComment {
    fn match_len(&self, input: &str) -> Option<usize> {
        if !input.starts_with(self.0) {
            return None;
        }
        Some(input.find('\n').unwrap_or(input.len()))
    }
}

/// Matches `pattern`, producing the matched text.
pub fn matches<'a, P: Pattern>(pattern: P) -> impl Parser<'a, &'a str> {
    move |input: &'a str| match pattern.match_len(input) {
        Some(len) => ParseResult::parsed(&input[..len], &input[len..]),
        None => ParseResult::failed(input),
    }
}

/// Matches `pattern`, producing `value` in place of the matched text.
pub fn matches_as<'a, P: Pattern, T: Clone>(
    pattern: P,
    value: T,
) -> impl Parser<'a, T> {
    matches(pattern).map_parsed(move |_| value.clone())
}

/// Always succeeds; a failure of `parser` becomes `None` with nothing
/// consumed.
pub fn optional<'a, T>(parser: impl Parser<'a, T>) -> impl Parser<'a, Option<T>> {
    move |input: &'a str| match parser.parse(input) {
        ParseResult::Parsed { value, unparsed } => {
            ParseResult::parsed(Some(value), unparsed)
        }
        ParseResult::Failed { .. } => ParseResult::parsed(None, input),
    }
}

/// Applies `parser` until it fails. Fails if it does not succeed at least
/// once; wrap in [`optional`] to accept zero repetitions.
pub fn many<'a, T>(parser: impl Parser<'a, T>) -> impl Parser<'a, Vec<T>> {
    move |input: &'a str| {
        let mut values = vec![];
        let mut unparsed = input;
        while let ParseResult::Parsed {
            value,
            unparsed: rest,
        } = parser.parse(unparsed)
        {
            let progressed = rest.len() < unparsed.len();
            values.push(value);
            unparsed = rest;
            // a parser that consumes nothing would repeat forever
            if !progressed {
                break;
            }
        }

        if values.is_empty() {
            ParseResult::failed(input)
        } else {
            ParseResult::parsed(values, unparsed)
        }
    }
}

/// A tuple of parsers with the same output, tried in order.
pub trait Alternatives<'a, T> {
    fn parse_first(&self, input: &'a str) -> ParseResult<'a, T>;
}

macro_rules! impl_alternatives {
    ($($parser:ident $binding:ident),+) => {
        impl<'a, T, $($parser: Parser<'a, T>),+> Alternatives<'a, T> for ($($parser,)+) {
            fn parse_first(&self, input: &'a str) -> ParseResult<'a, T> {
                let ($($binding,)+) = self;
                $(
                    let result = $binding.parse(input);
                    if !result.is_failed() {
                        return result;
                    }
                )+
                ParseResult::failed(input)
            }
        }
    };
}

impl_alternatives!(A a, B b);
impl_alternatives!(A a, B b, C c);
impl_alternatives!(A a, B b, C c, D d);
impl_alternatives!(A a, B b, C c, D d, E e);
impl_alternatives!(A a, B b, C c, D d, E e, F f);
impl_alternatives!(A a, B b, C c, D d, E e, F f, G g);
impl_alternatives!(A a, B b, C c, D d, E e, F f, G g, H h);
impl_alternatives!(A a, B b, C c, D d, E e, F f, G g, H h, I i);
impl_alternatives!(A a, B b, C c, D d, E e, F f, G g, H h, I i, J j);
impl_alternatives!(A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k);
impl_alternatives!(A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k, L l);

/// Ordered choice: the first alternative to succeed wins.
pub fn either<'a, T>(alternatives: impl Alternatives<'a, T>) -> impl Parser<'a, T> {
    move |input: &'a str| alternatives.parse_first(input)
}

/// A tuple of parsers run one after another, producing a tuple.
pub trait Sequence<'a, O> {
    fn parse_all(&self, input: &'a str) -> ParseResult<'a, O>;
}

macro_rules! impl_sequence {
    ($($parser:ident $value:ident $binding:ident),+) => {
        impl<'a, $($value,)+ $($parser: Parser<'a, $value>),+> Sequence<'a, ($($value,)+)> for ($($parser,)+) {
            fn parse_all(&self, input: &'a str) -> ParseResult<'a, ($($value,)+)> {
                let ($($binding,)+) = self;
                let unparsed = input;
                $(
                    let ($binding, unparsed) = match $binding.parse(unparsed) {
                        ParseResult::Parsed { value, unparsed } => (value, unparsed),
                        ParseResult::Failed { .. } => return ParseResult::failed(input),
                    };
                )+
                ParseResult::parsed(($($binding,)+), unparsed)
            }
        }
    };
}

impl_sequence!(A TA a, B TB b);
impl_sequence!(A TA a, B TB b, C TC c);
impl_sequence!(A TA a, B TB b, C TC c, D TD d);
impl_sequence!(A TA a, B TB b, C TC c, D TD d, E TE e);
impl_sequence!(A TA a, B TB b, C TC c, D TD d, E TE e, F TF f);
impl_sequence!(A TA a, B TB b, C TC c, D TD d, E TE e, F TF f, G TG g);
impl_sequence!(A TA a, B TB b, C TC c, D TD d, E TE e, F TF f, G TG g, H TH h);

/// Runs every parser in turn, threading the remaining input through. Fails
/// with the original input untouched as soon as one of them fails.
pub fn all<'a, O>(sequence: impl Sequence<'a, O>) -> impl Parser<'a, O> {
    move |input: &'a str| sequence.parse_all(input)
}
