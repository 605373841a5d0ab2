//! Token-stream parser for the dialog script grammar.
//!
//! Operates over `&[Spanned]` rather than bytes: the lexer already split the
//! source into tokens, so parsing here is a set of small combinators dispatched
//! by the next token's shape, in the same style as a `nom`-based parser over a
//! non-`u8` input (token streams instead of text).

use crate::error::CoreError;
use crate::lexer::{CmpOp, Spanned, Token};
use nom::branch::alt;
use nom::combinator::opt;
use nom::multi::many0;
use nom::sequence::tuple;
use nom::IResult;

pub type Input<'a> = &'a [Spanned];
pub type PResult<'a, O> = IResult<Input<'a>, O>;

fn fail<'a, O>(input: Input<'a>) -> PResult<'a, O> {
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

fn kw<'a>(name: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, ()> {
    move |input: Input<'a>| match input.split_first() {
        Some((sp, rest)) if matches!(&sp.token, Token::Ident(s) if s == name) => Ok((rest, ())),
        _ => fail(input),
    }
}

fn any_ident(input: Input) -> PResult<(String, u32)> {
    match input.split_first() {
        Some((sp, rest)) => match &sp.token {
            Token::Ident(s) => Ok((rest, (s.clone(), sp.line))),
            _ => fail(input),
        },
        None => fail(input),
    }
}

fn any_variable(input: Input) -> PResult<(String, u32)> {
    match input.split_first() {
        Some((sp, rest)) => match &sp.token {
            Token::Variable(s) => Ok((rest, (s.clone(), sp.line))),
            _ => fail(input),
        },
        None => fail(input),
    }
}

fn any_str(input: Input) -> PResult<(String, u32)> {
    match input.split_first() {
        Some((sp, rest)) => match &sp.token {
            Token::Str(s) => Ok((rest, (s.clone(), sp.line))),
            _ => fail(input),
        },
        None => fail(input),
    }
}

fn any_int(input: Input) -> PResult<(i64, u32)> {
    match input.split_first() {
        Some((sp, rest)) => match &sp.token {
            Token::Int(v) => Ok((rest, (*v, sp.line))),
            _ => fail(input),
        },
        None => fail(input),
    }
}

/// Accepts either an `Int` or `Real` token as a real-valued literal (the
/// grammar's `real_const` terminal matches both representations).
fn any_real(input: Input) -> PResult<(f64, u32)> {
    match input.split_first() {
        Some((sp, rest)) => match &sp.token {
            Token::Real(v) => Ok((rest, (*v, sp.line))),
            Token::Int(v) => Ok((rest, (*v as f64, sp.line))),
            _ => fail(input),
        },
        None => fail(input),
    }
}

fn any_cmp_op(input: Input) -> PResult<CmpOp> {
    match input.split_first() {
        Some((sp, rest)) => match &sp.token {
            Token::CmpOp(op) => Ok((rest, *op)),
            _ => fail(input),
        },
        None => fail(input),
    }
}

fn plus(input: Input) -> PResult<()> {
    match input.split_first() {
        Some((sp, rest)) if sp.token == Token::Plus => Ok((rest, ())),
        _ => fail(input),
    }
}

// ---------------------------------------------------------------------
// Parse tree
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum VarTypeLit {
    Int(i64),
    Real(f64),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct VarClause {
    pub name: String,
    pub ty: VarTypeLit,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum SpeakPart {
    Var(String),
    Str(String),
    Copy,
}

#[derive(Debug, Clone)]
pub struct Speak {
    pub parts: Vec<SpeakPart>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum TypeTag {
    Int,
    Real,
}

#[derive(Debug, Clone)]
pub enum Condition {
    Length(CmpOp, i64),
    Contain(String),
    Type(TypeTag),
    Equal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Add,
    Sub,
    Set,
}

#[derive(Debug, Clone)]
pub enum UpdateValue {
    Real(f64),
    Text(String),
    Copy,
}

#[derive(Debug, Clone)]
pub enum Action {
    Exit,
    Goto { target: String, line: u32 },
    Update {
        var: String,
        op: UpdateOp,
        value: UpdateValue,
        line: u32,
    },
    Speak(Speak),
}

#[derive(Debug, Clone)]
pub struct CaseClause {
    pub condition: Condition,
    pub actions: Vec<Action>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct StateDef {
    pub name: String,
    pub verified: bool,
    pub on_enter: Vec<Action>,
    pub cases: Vec<CaseClause>,
    pub default: Vec<Action>,
    pub timeouts: Vec<(i64, Vec<Action>, u32)>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum Definition {
    Variable(Vec<VarClause>),
    State(StateDef),
}

// ---------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------

fn variable_clause(input: Input) -> PResult<VarClause> {
    let (input, (name, line)) = any_variable(input)?;
    let int_branch = |input| -> PResult<VarTypeLit> {
        let (input, _) = kw("Int")(input)?;
        let (input, (v, _)) = any_int(input)?;
        Ok((input, VarTypeLit::Int(v)))
    };
    let real_branch = |input| -> PResult<VarTypeLit> {
        let (input, _) = kw("Real")(input)?;
        let (input, (v, _)) = any_real(input)?;
        Ok((input, VarTypeLit::Real(v)))
    };
    let text_branch = |input| -> PResult<VarTypeLit> {
        let (input, _) = kw("Text")(input)?;
        let (input, (v, _)) = any_str(input)?;
        Ok((input, VarTypeLit::Text(v)))
    };
    let (input, ty) = alt((int_branch, real_branch, text_branch))(input)?;
    Ok((input, VarClause { name, ty, line }))
}

fn variable_definition(input: Input) -> PResult<Definition> {
    let (input, _) = kw("Variable")(input)?;
    let (input, clauses) = nom::multi::many1(variable_clause)(input)?;
    Ok((input, Definition::Variable(clauses)))
}

fn speak_content(input: Input) -> PResult<SpeakPart> {
    alt((
        |i| any_variable(i).map(|(r, (s, _))| (r, SpeakPart::Var(s))),
        |i| any_str(i).map(|(r, (s, _))| (r, SpeakPart::Str(s))),
    ))(input)
}

fn speak_content_copy(input: Input) -> PResult<SpeakPart> {
    alt((
        |i| kw("Copy")(i).map(|(r, _)| (r, SpeakPart::Copy)),
        speak_content,
    ))(input)
}

fn speak_action(input: Input) -> PResult<Action> {
    let (input, _) = kw("Speak")(input)?;
    let start_line = input
        .first()
        .map(|s| s.line)
        .unwrap_or(0);
    let (input, first) = speak_content(input)?;
    let (input, rest) = many0(|i| {
        let (i, _) = plus(i)?;
        speak_content(i)
    })(input)?;
    let mut parts = vec![first];
    parts.extend(rest);
    Ok((
        input,
        Action::Speak(Speak {
            parts,
            line: start_line,
        }),
    ))
}

fn speak_action_copy(input: Input) -> PResult<Action> {
    let (input, _) = kw("Speak")(input)?;
    let start_line = input.first().map(|s| s.line).unwrap_or(0);
    let (input, first) = speak_content_copy(input)?;
    let (input, rest) = many0(|i| {
        let (i, _) = plus(i)?;
        speak_content_copy(i)
    })(input)?;
    let mut parts = vec![first];
    parts.extend(rest);
    Ok((
        input,
        Action::Speak(Speak {
            parts,
            line: start_line,
        }),
    ))
}

fn exit_action(input: Input) -> PResult<Action> {
    let (input, _) = kw("Exit")(input)?;
    Ok((input, Action::Exit))
}

fn goto_action(input: Input) -> PResult<Action> {
    let (input, _) = kw("Goto")(input)?;
    let (input, (target, line)) = any_ident(input)?;
    Ok((input, Action::Goto { target, line }))
}

fn update_op(input: Input) -> PResult<UpdateOp> {
    alt((
        |i| kw("Add")(i).map(|(r, _)| (r, UpdateOp::Add)),
        |i| kw("Sub")(i).map(|(r, _)| (r, UpdateOp::Sub)),
        |i| kw("Set")(i).map(|(r, _)| (r, UpdateOp::Set)),
    ))(input)
}

fn update_action(input: Input) -> PResult<Action> {
    let (input, _) = kw("Update")(input)?;
    let (input, (var, line)) = any_variable(input)?;

    let numeric_branch = |input: Input| -> PResult<(UpdateOp, UpdateValue)> {
        let (input, op) = update_op(input)?;
        let (input, value) = alt((
            |i| any_real(i).map(|(r, (v, _))| (r, UpdateValue::Real(v))),
            |i| kw("Copy")(i).map(|(r, _)| (r, UpdateValue::Copy)),
        ))(input)?;
        Ok((input, (op, value)))
    };
    let text_branch = |input: Input| -> PResult<(UpdateOp, UpdateValue)> {
        let (input, _) = kw("Set")(input)?;
        let (input, value) = alt((
            |i| any_str(i).map(|(r, (v, _))| (r, UpdateValue::Text(v))),
            |i| kw("Copy")(i).map(|(r, _)| (r, UpdateValue::Copy)),
        ))(input)?;
        Ok((input, (UpdateOp::Set, value)))
    };

    let (input, (op, value)) = alt((numeric_branch, text_branch))(input)?;
    Ok((
        input,
        Action::Update {
            var,
            op,
            value,
            line,
        },
    ))
}

fn trailing_action(input: Input) -> PResult<Action> {
    alt((exit_action, goto_action))(input)
}

fn case_clause(input: Input) -> PResult<CaseClause> {
    let (input, _) = kw("Case")(input)?;
    let line = input.first().map(|s| s.line).unwrap_or(0);
    let (input, condition) = condition(input)?;
    let (input, mut actions) = many0(alt((update_action, speak_action_copy)))(input)?;
    let (input, trailing) = opt(trailing_action)(input)?;
    if let Some(a) = trailing {
        actions.push(a);
    }
    Ok((
        input,
        CaseClause {
            condition,
            actions,
            line,
        },
    ))
}

fn condition(input: Input) -> PResult<Condition> {
    let length = |input: Input| -> PResult<Condition> {
        let (input, _) = kw("Length")(input)?;
        let (input, op) = any_cmp_op(input)?;
        let (input, (n, _)) = any_int(input)?;
        Ok((input, Condition::Length(op, n)))
    };
    let contain = |input: Input| -> PResult<Condition> {
        let (input, _) = kw("Contain")(input)?;
        let (input, (s, _)) = any_str(input)?;
        Ok((input, Condition::Contain(s)))
    };
    let type_cond = |input: Input| -> PResult<Condition> {
        let (input, _) = kw("Type")(input)?;
        let (input, tag) = alt((
            |i| kw("Int")(i).map(|(r, _)| (r, TypeTag::Int)),
            |i| kw("Real")(i).map(|(r, _)| (r, TypeTag::Real)),
        ))(input)?;
        Ok((input, Condition::Type(tag)))
    };
    let equal = |input: Input| -> PResult<Condition> {
        let (input, (s, _)) = any_str(input)?;
        Ok((input, Condition::Equal(s)))
    };
    alt((length, contain, type_cond, equal))(input)
}

fn default_clause(input: Input) -> PResult<Vec<Action>> {
    let (input, _) = kw("Default")(input)?;
    let (input, mut actions) = many0(alt((update_action, speak_action_copy)))(input)?;
    let (input, trailing) = opt(trailing_action)(input)?;
    if let Some(a) = trailing {
        actions.push(a);
    }
    Ok((input, actions))
}

fn timeout_clause(input: Input) -> PResult<(i64, Vec<Action>, u32)> {
    let (input, _) = kw("Timeout")(input)?;
    let (input, (seconds, line)) = any_int(input)?;
    let (input, mut actions) = many0(alt((update_action, speak_action)))(input)?;
    let (input, trailing) = opt(trailing_action)(input)?;
    if let Some(a) = trailing {
        actions.push(a);
    }
    Ok((input, (seconds, actions, line)))
}

fn state_definition(input: Input) -> PResult<Definition> {
    let (input, _) = kw("State")(input)?;
    let (input, (name, line)) = any_ident(input)?;
    let (input, verified) = opt(kw("Verified"))(input)?;
    let (input, on_enter) = many0(speak_action)(input)?;
    let (input, cases) = many0(case_clause)(input)?;
    let (input, default) = default_clause(input)?;
    let (input, timeouts) = many0(timeout_clause)(input)?;
    Ok((
        input,
        Definition::State(StateDef {
            name,
            verified: verified.is_some(),
            on_enter,
            cases,
            default,
            timeouts,
            line,
        }),
    ))
}

fn definition(input: Input) -> PResult<Definition> {
    alt((state_definition, variable_definition))(input)
}

/// Parses one source's full token stream into a list of top-level definitions.
pub fn parse_tokens(tokens: &[Spanned]) -> Result<Vec<Definition>, CoreError> {
    let (rest, (defs, _)) = tuple((many0(definition), nom::combinator::eof))(tokens).map_err(|_| {
        let line = tokens.first().map(|s| s.line).unwrap_or(0);
        CoreError::grammar("failed to parse script", format!("near line {line}"))
    })?;
    if !rest.is_empty() {
        let line = rest[0].line;
        return Err(CoreError::grammar(
            "trailing tokens could not be parsed as a definition",
            format!("line {line}"),
        ));
    }
    Ok(defs)
}

/// Lexes and parses every source string, concatenating their top-level
/// definitions in order - mirroring the source grammar's multi-file
/// `parse_files` behaviour.
pub fn parse_sources(sources: &[String]) -> Result<Vec<Definition>, CoreError> {
    let mut all = Vec::new();
    for source in sources {
        if source.is_empty() {
            continue;
        }
        let tokens = crate::lexer::lex(source)?;
        all.extend(parse_tokens(&tokens)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Vec<Definition> {
        let tokens = crate::lexer::lex(src).unwrap();
        parse_tokens(&tokens).unwrap()
    }

    #[test]
    fn parses_variable_definition() {
        let defs = parse_one(r#"Variable $balance Int 0 $name Text "guest""#);
        match &defs[0] {
            Definition::Variable(clauses) => assert_eq!(clauses.len(), 2),
            _ => panic!("expected variable definition"),
        }
    }

    #[test]
    fn parses_minimal_welcome_state() {
        let defs = parse_one(
            r#"State Welcome
               Speak "hello"
               Default Speak "bye""#,
        );
        match &defs[0] {
            Definition::State(s) => {
                assert_eq!(s.name, "Welcome");
                assert!(!s.verified);
                assert_eq!(s.on_enter.len(), 1);
            }
            _ => panic!("expected state definition"),
        }
    }

    #[test]
    fn parses_verified_state_with_case_and_goto() {
        let defs = parse_one(
            r#"State Profile Verified
               Case "rename" Goto Welcome
               Default Exit"#,
        );
        match &defs[0] {
            Definition::State(s) => {
                assert!(s.verified);
                assert_eq!(s.cases.len(), 1);
            }
            _ => panic!("expected state definition"),
        }
    }

    #[test]
    fn rejects_garbage_input() {
        let tokens = crate::lexer::lex("Banana $x").unwrap();
        assert!(parse_tokens(&tokens).is_err());
    }

    #[test]
    fn parses_timeout_clause() {
        let defs = parse_one(
            r#"State Welcome
               Default Exit
               Timeout 60 Speak "idle" Goto Welcome"#,
        );
        match &defs[0] {
            Definition::State(s) => {
                assert_eq!(s.timeouts.len(), 1);
                assert_eq!(s.timeouts[0].0, 60);
            }
            _ => panic!("expected state definition"),
        }
    }
}
