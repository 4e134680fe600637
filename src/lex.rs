use combine::{
    attempt, between, choice, eof, from_str, many, many1,
    parser::{
        byte::{bytes, digit, letter, spaces},
        combinator::recognize,
    },
    satisfy, token, Parser, Stream,
};
use thiserror::Error;

pub trait ByteStream<'a>: Stream<Token = u8, Range = &'a [u8]> + 'a {}
impl<'a, T: Stream<Token = u8, Range = &'a [u8]> + 'a> ByteStream<'a> for T {}

#[derive(Error, Debug)]
#[error("unrecognized token in script source")]
pub struct LexError;

#[derive(Debug, PartialEq)]
pub enum Token {
    // keywords
    False,
    Local,
    Nil,
    True,

    // punctuation
    Assign,
    ParL,
    ParR,
    CurlyL,
    CurlyR,

    // constant values
    Integer(i64),
    Float(f64),
    String(String),

    // names of globals or locals
    Name(String),

    // end
    Eos,
}

pub struct Lex<S> {
    input: Option<S>,
    ahead: Token,
}

impl<'a, S: ByteStream<'a>> Lex<S> {
    pub fn new(input: S) -> Self {
        Self {
            input: Some(input),
            ahead: Token::Eos,
        }
    }

    pub fn next(&mut self) -> Result<Token, LexError> {
        if self.ahead == Token::Eos {
            self.do_next()
        } else {
            Ok(std::mem::replace(&mut self.ahead, Token::Eos))
        }
    }

    pub fn peek(&mut self) -> Result<&Token, LexError> {
        if self.ahead == Token::Eos {
            self.ahead = self.do_next()?;
        }
        Ok(&self.ahead)
    }

    fn do_next(&mut self) -> Result<Token, LexError> {
        let input = self.input.take();
        let (t, rest) = script_token().parse(input.unwrap()).map_err(|_| LexError)?;
        self.input = Some(rest);
        Ok(t)
    }
}

fn script_token<'a, Input>() -> impl Parser<Input, Output = Token> + 'a
where
    Input: ByteStream<'a>,
{
    let name = recognize((
        letter().or(token(b'_')),
        many::<Vec<_>, _, _>(letter().or(digit()).or(token(b'_'))),
    ))
    .map(|v: Vec<u8>| Token::Name(String::from_utf8_lossy(&v).to_string()));
    let string = between(token(b'"'), token(b'"'), many(satisfy(|c| c != b'"')))
        .map(|v: Vec<u8>| Token::String(String::from_utf8_lossy(&v).to_string()));
    let eos = eof().map(|_| Token::Eos);
    spaces().with(choice((
        keywords(),
        punctuation(),
        attempt(float()),
        integer(),
        name,
        string,
        eos,
    )))
}

fn keywords<'a, Input>() -> impl Parser<Input, Output = Token> + 'a
where
    Input: ByteStream<'a>,
{
    choice((
        attempt(bytes(&b"false"[..])).map(|_| Token::False),
        attempt(bytes(&b"local"[..])).map(|_| Token::Local),
        attempt(bytes(&b"nil"[..])).map(|_| Token::Nil),
        attempt(bytes(&b"true"[..])).map(|_| Token::True),
    ))
}

fn punctuation<'a, Input>() -> impl Parser<Input, Output = Token> + 'a
where
    Input: ByteStream<'a>,
{
    choice((
        token(b'=').map(|_| Token::Assign),
        token(b'(').map(|_| Token::ParL),
        token(b')').map(|_| Token::ParR),
        token(b'{').map(|_| Token::CurlyL),
        token(b'}').map(|_| Token::CurlyR),
    ))
}

fn integer<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = u8>,
{
    from_str(many1::<Vec<_>, _, _>(digit())).map(Token::Integer)
}

fn float<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = u8>,
{
    from_str(recognize::<Vec<_>, _, _>((
        many1::<Vec<_>, _, _>(digit()),
        token(b'.'),
        many1::<Vec<_>, _, _>(digit()),
    )))
    .map(Token::Float)
}
