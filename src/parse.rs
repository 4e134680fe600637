use std::rc::Rc;

use thiserror::Error;

use crate::{
    bytecode::ByteCode,
    lex::{ByteStream, Lex, LexError, Token},
    value::Value,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected variable name after `local`")]
    ExpectedName,
    #[error("expected `=` after variable name")]
    ExpectedAssign,
    #[error("expected `)` to close call arguments")]
    UnclosedCall,
    #[error("expected `}}` to close block")]
    UnclosedBlock,
    #[error("expected call arguments, got {0}")]
    ExpectedArguments(String),
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
}

/// A compiled chunk. Blocks passed as call arguments become nested
/// prototypes, loaded at run time by `ByteCode::Closure`.
#[derive(Debug, PartialEq)]
pub struct ParseProto {
    pub chunk: String,
    pub constants: Vec<Value>,
    pub byte_codes: Vec<ByteCode>,
    pub protos: Vec<Rc<ParseProto>>,
}

impl ParseProto {
    fn new(chunk: &str) -> Self {
        Self {
            chunk: chunk.to_owned(),
            constants: Vec::new(),
            byte_codes: Vec::new(),
            protos: Vec::new(),
        }
    }
}

#[derive(PartialEq)]
enum BlockEnd {
    Eos,
    Brace,
}

pub fn load(source: &str, chunk: &str) -> Result<ParseProto, ParseError> {
    let mut lex = Lex::new(source.as_bytes());
    let proto = parse_block(&mut lex, BlockEnd::Eos, chunk)?;

    log::debug!("{chunk}: constants: {:?}", proto.constants);
    for code in &proto.byte_codes {
        log::debug!("    {code:?}");
    }

    Ok(proto)
}

fn parse_block<'a, S: ByteStream<'a>>(
    lex: &mut Lex<S>,
    end: BlockEnd,
    chunk: &str,
) -> Result<ParseProto, ParseError> {
    let mut proto = ParseProto::new(chunk);
    let mut locals = Vec::new();

    loop {
        match lex.next()? {
            Token::Name(name) => parse_call(lex, &mut proto, &locals, name)?,
            Token::Local => {
                let Token::Name(var) = lex.next()? else {
                    return Err(ParseError::ExpectedName);
                };

                if lex.next()? != Token::Assign {
                    return Err(ParseError::ExpectedAssign);
                }

                let token = lex.next()?;
                load_exp(
                    &mut proto.byte_codes,
                    &mut proto.constants,
                    &locals,
                    token,
                    locals.len(),
                )?;

                locals.push(var);
            }
            Token::CurlyR if end == BlockEnd::Brace => break,
            Token::Eos if end == BlockEnd::Eos => break,
            Token::Eos => return Err(ParseError::UnclosedBlock),
            t => return Err(ParseError::UnexpectedToken(format!("{t:?}"))),
        }
    }

    Ok(proto)
}

// A call statement takes zero or one argument: `name(exp)`, `name "str"`
// or `name { block }`.
fn parse_call<'a, S: ByteStream<'a>>(
    lex: &mut Lex<S>,
    proto: &mut ParseProto,
    locals: &[String],
    name: String,
) -> Result<(), ParseError> {
    let dst = locals.len();
    let code = load_var(&mut proto.constants, locals, dst, name);
    proto.byte_codes.push(code);

    let nargs = match lex.next()? {
        Token::ParL => {
            if lex.peek()? == &Token::ParR {
                lex.next()?;
                0
            } else {
                let token = lex.next()?;
                load_exp(
                    &mut proto.byte_codes,
                    &mut proto.constants,
                    locals,
                    token,
                    dst + 1,
                )?;

                if lex.next()? != Token::ParR {
                    return Err(ParseError::UnclosedCall);
                }
                1
            }
        }
        Token::String(s) => {
            let code = load_const(&mut proto.constants, dst + 1, Value::String(s));
            proto.byte_codes.push(code);
            1
        }
        Token::CurlyL => {
            let chunk = proto.chunk.clone();
            let block = parse_block(lex, BlockEnd::Brace, &chunk)?;
            proto.protos.push(Rc::new(block));
            proto
                .byte_codes
                .push(ByteCode::Closure((dst + 1) as u8, (proto.protos.len() - 1) as u8));
            1
        }
        t => return Err(ParseError::ExpectedArguments(format!("{t:?}"))),
    };
    proto.byte_codes.push(ByteCode::Call(dst as u8, nargs));
    Ok(())
}

fn add_const(constants: &mut Vec<Value>, c: Value) -> usize {
    constants.iter().position(|v| v == &c).unwrap_or_else(|| {
        constants.push(c);
        constants.len() - 1
    })
}

fn load_const(constants: &mut Vec<Value>, dst: usize, c: Value) -> ByteCode {
    ByteCode::LoadConst(dst as u8, add_const(constants, c) as u8)
}

fn load_exp(
    byte_codes: &mut Vec<ByteCode>,
    constants: &mut Vec<Value>,
    locals: &[String],
    token: Token,
    dst: usize,
) -> Result<(), ParseError> {
    let code = match token {
        Token::Nil => ByteCode::LoadNil(dst as u8),
        Token::True => ByteCode::LoadBool(dst as u8, true),
        Token::False => ByteCode::LoadBool(dst as u8, false),
        Token::Integer(i) => {
            if let Ok(ii) = i16::try_from(i) {
                ByteCode::LoadInt(dst as u8, ii)
            } else {
                load_const(constants, dst, Value::Integer(i))
            }
        }
        Token::Float(f) => load_const(constants, dst, Value::Float(f)),
        Token::String(s) => load_const(constants, dst, Value::String(s)),
        Token::Name(var) => load_var(constants, locals, dst, var),
        t => return Err(ParseError::InvalidExpression(format!("{t:?}"))),
    };
    byte_codes.push(code);
    Ok(())
}

fn load_var(constants: &mut Vec<Value>, locals: &[String], dst: usize, name: String) -> ByteCode {
    if let Some(i) = locals.iter().rposition(|v| v == &name) {
        ByteCode::Move(dst as u8, i as u8)
    } else {
        let ic = add_const(constants, Value::String(name));
        ByteCode::GetGlobal(dst as u8, ic as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_print_string() {
        let proto = load(r#"print "hi""#, "test chunk").unwrap();
        assert_eq!(
            proto.byte_codes,
            vec![
                ByteCode::GetGlobal(0, 0),
                ByteCode::LoadConst(1, 1),
                ByteCode::Call(0, 1),
            ]
        );
        assert_eq!(
            proto.constants,
            vec![Value::String("print".into()), Value::String("hi".into())]
        );
    }

    #[test]
    fn compile_empty_chunk() {
        let proto = load("", "test chunk").unwrap();
        assert!(proto.byte_codes.is_empty());
        assert!(proto.protos.is_empty());
    }

    #[test]
    fn compile_block_argument() {
        let proto = load("test { doSomething() }", "test chunk").unwrap();
        assert_eq!(
            proto.byte_codes,
            vec![
                ByteCode::GetGlobal(0, 0),
                ByteCode::Closure(1, 0),
                ByteCode::Call(0, 1),
            ]
        );
        assert_eq!(proto.protos.len(), 1);

        let block = &proto.protos[0];
        assert_eq!(
            block.byte_codes,
            vec![ByteCode::GetGlobal(0, 0), ByteCode::Call(0, 0)]
        );
        assert_eq!(block.chunk, "test chunk");
    }

    #[test]
    fn compile_sibling_blocks_in_order() {
        let proto = load("test { print \"a\" } test { print \"b\" }", "t").unwrap();
        assert_eq!(proto.protos.len(), 2);
        assert!(proto.protos[0].constants.contains(&Value::String("a".into())));
        assert!(proto.protos[1].constants.contains(&Value::String("b".into())));
    }

    #[test]
    fn compile_local_and_use() {
        let proto = load("local x = 1 print(x)", "t").unwrap();
        assert_eq!(
            proto.byte_codes,
            vec![
                ByteCode::LoadInt(0, 1),
                ByteCode::GetGlobal(1, 0),
                ByteCode::Move(2, 0),
                ByteCode::Call(1, 1),
            ]
        );
    }

    #[test]
    fn compile_zero_arg_call() {
        let proto = load("doSomething()", "t").unwrap();
        assert_eq!(
            proto.byte_codes,
            vec![ByteCode::GetGlobal(0, 0), ByteCode::Call(0, 0)]
        );
    }

    #[test]
    fn constants_are_deduplicated() {
        let proto = load(r#"print "x" print "x""#, "t").unwrap();
        assert_eq!(proto.constants.len(), 2);
    }

    #[test]
    fn reject_unclosed_block() {
        assert!(matches!(
            load("test { print \"a\"", "t"),
            Err(ParseError::UnclosedBlock)
        ));
    }

    #[test]
    fn reject_local_without_assign() {
        assert!(matches!(
            load("local x 1", "t"),
            Err(ParseError::ExpectedAssign)
        ));
    }

    #[test]
    fn reject_unclosed_call() {
        assert!(matches!(
            load("print(1 test", "t"),
            Err(ParseError::UnclosedCall)
        ));
    }

    #[test]
    fn reject_bare_keyword() {
        assert!(matches!(load("nil", "t"), Err(ParseError::UnexpectedToken(_))));
    }
}
