//! Folds the parse tree into a [`VariableSchema`] and [`StateGraph`],
//! performing every static check in
//! the same pass that lowers the clause. Unlike the teacher's
//! `compiler::verifier`, which walks an already-built graph and collects a
//! `Vec<VerifyError>`, this validator fails fast on the first violation - it
//! mirrors the source grammar's own exception-per-violation behaviour, and
//! there is no later "graph" stage to re-walk since lowering and checking
//! happen together.

use crate::error::CoreError;
use crate::ir::{
    Action as IrAction, CaseClause as IrCaseClause, Condition as IrCondition, State as IrState,
    StateGraph, UpdateOp as IrUpdateOp, UpdateValue as IrUpdateValue, VarType, VariableSchema,
    VariableValue,
};
use crate::parser::{
    Action as PAction, CaseClause as PCaseClause, Condition as PCondition, Definition, Speak,
    SpeakPart as PSpeakPart, StateDef, TypeTag, UpdateOp as PUpdateOp, UpdateValue as PUpdateValue,
    VarTypeLit,
};
use std::collections::{HashMap, HashSet};

fn err(message: impl Into<String>, line: u32) -> CoreError {
    CoreError::grammar(message, format!("line {line}"))
}

pub fn build(definitions: Vec<Definition>) -> Result<(VariableSchema, StateGraph), CoreError> {
    let mut schema = VariableSchema::new();
    let mut state_defs: Vec<StateDef> = Vec::new();
    let mut seen_state_names = HashSet::new();

    for def in definitions {
        match def {
            Definition::Variable(clauses) => {
                for clause in clauses {
                    let default = match clause.ty {
                        VarTypeLit::Int(v) => VariableValue::Int(v),
                        VarTypeLit::Real(v) => VariableValue::Real(v),
                        VarTypeLit::Text(v) => VariableValue::Text(v),
                    };
                    schema
                        .declare(&clause.name, default)
                        .map_err(|m| err(m, clause.line))?;
                }
            }
            Definition::State(state) => {
                if !seen_state_names.insert(state.name.clone()) {
                    return Err(err(
                        format!("duplicate state name '{}'", state.name),
                        state.line,
                    ));
                }
                state_defs.push(state);
            }
        }
    }

    if state_defs.is_empty() {
        return Err(err("script defines no states", 0));
    }

    let welcome_pos = state_defs
        .iter()
        .position(|s| s.name == "Welcome")
        .ok_or_else(|| err("script has no Welcome state", 0))?;
    if state_defs[welcome_pos].verified {
        return Err(err("Welcome state must not be Verified", state_defs[welcome_pos].line));
    }
    state_defs.swap(0, welcome_pos);

    let names_index: HashMap<String, usize> = state_defs
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.clone(), i))
        .collect();
    let verified_flags: Vec<bool> = state_defs.iter().map(|s| s.verified).collect();

    let mut states = Vec::with_capacity(state_defs.len());
    for state in &state_defs {
        let on_enter = lower_actions(&state.on_enter, &schema, &names_index, &verified_flags, state.verified, None)?;

        let mut cases = Vec::with_capacity(state.cases.len());
        for case in &state.cases {
            cases.push(lower_case(case, &schema, &names_index, &verified_flags, state.verified)?);
        }

        let default_actions = lower_actions(
            &state.default,
            &schema,
            &names_index,
            &verified_flags,
            state.verified,
            Some(VarType::Text),
        )?;

        let mut timeouts = Vec::with_capacity(state.timeouts.len());
        for (seconds, actions, _line) in &state.timeouts {
            let lowered = lower_actions(actions, &schema, &names_index, &verified_flags, state.verified, None)?;
            timeouts.push((*seconds, lowered));
        }

        states.push(IrState {
            name: state.name.clone(),
            verified: state.verified,
            on_enter,
            cases,
            default_actions,
            timeouts,
        });
    }

    Ok((schema, StateGraph::new(states)))
}

fn lower_case(
    case: &PCaseClause,
    schema: &VariableSchema,
    names_index: &HashMap<String, usize>,
    verified_flags: &[bool],
    current_verified: bool,
) -> Result<IrCaseClause, CoreError> {
    let condition = lower_condition(&case.condition);
    let copy_ctx = Some(condition.copy_context());
    let actions = lower_actions(&case.actions, schema, names_index, verified_flags, current_verified, copy_ctx)?;
    Ok(IrCaseClause { condition, actions })
}

fn lower_condition(cond: &PCondition) -> IrCondition {
    match cond {
        PCondition::Length(op, n) => IrCondition::Length(*op, *n),
        PCondition::Contain(s) => IrCondition::Contain(s.clone()),
        PCondition::Type(TypeTag::Int) => IrCondition::Type(VarType::Int),
        PCondition::Type(TypeTag::Real) => IrCondition::Type(VarType::Real),
        PCondition::Equal(s) => IrCondition::Equal(s.clone()),
    }
}

fn lower_actions(
    actions: &[PAction],
    schema: &VariableSchema,
    names_index: &HashMap<String, usize>,
    verified_flags: &[bool],
    current_verified: bool,
    copy_ctx: Option<VarType>,
) -> Result<Vec<IrAction>, CoreError> {
    actions
        .iter()
        .map(|a| lower_action(a, schema, names_index, verified_flags, current_verified, copy_ctx))
        .collect()
}

fn lower_action(
    action: &PAction,
    schema: &VariableSchema,
    names_index: &HashMap<String, usize>,
    verified_flags: &[bool],
    current_verified: bool,
    copy_ctx: Option<VarType>,
) -> Result<IrAction, CoreError> {
    match action {
        PAction::Exit => Ok(IrAction::Exit),
        PAction::Goto { target, line } => {
            let idx = names_index
                .get(target)
                .copied()
                .ok_or_else(|| err(format!("Goto target state '{target}' does not exist"), *line))?;
            Ok(IrAction::Goto {
                target: idx,
                verified: verified_flags[idx],
            })
        }
        PAction::Update { var, op, value, line } => {
            if !current_verified {
                return Err(err(
                    format!("Update of ${var} is only allowed in a Verified state"),
                    *line,
                ));
            }
            let vtype = schema
                .type_of(var)
                .ok_or_else(|| err(format!("unknown variable ${var}"), *line))?;
            let ir_value = lower_update_value(var, vtype, op, value, copy_ctx, *line)?;
            Ok(IrAction::Update {
                var: var.clone(),
                op: lower_op(*op),
                value: ir_value,
            })
        }
        PAction::Speak(speak) => Ok(IrAction::Speak(lower_speak(speak, schema)?)),
    }
}

fn lower_op(op: PUpdateOp) -> IrUpdateOp {
    match op {
        PUpdateOp::Add => IrUpdateOp::Add,
        PUpdateOp::Sub => IrUpdateOp::Sub,
        PUpdateOp::Set => IrUpdateOp::Set,
    }
}

fn lower_update_value(
    var: &str,
    vtype: VarType,
    op: &PUpdateOp,
    value: &PUpdateValue,
    copy_ctx: Option<VarType>,
    line: u32,
) -> Result<IrUpdateValue, CoreError> {
    match value {
        PUpdateValue::Copy => {
            let ctx = copy_ctx
                .ok_or_else(|| err(format!("Copy has no request input to read in this context (${var})"), line))?;
            let compatible = matches!(
                (vtype, ctx),
                (VarType::Int, VarType::Int) | (VarType::Real, VarType::Int) | (VarType::Real, VarType::Real) | (VarType::Text, VarType::Text)
            );
            if !compatible {
                return Err(err(
                    format!("Copy's established type does not match ${var}'s declared type"),
                    line,
                ));
            }
            Ok(IrUpdateValue::Copy)
        }
        PUpdateValue::Real(x) => match vtype {
            VarType::Int => {
                if x.fract() != 0.0 {
                    return Err(err(format!("non-integer value assigned to Int variable ${var}"), line));
                }
                Ok(IrUpdateValue::Literal(VariableValue::Int(*x as i64)))
            }
            VarType::Real => Ok(IrUpdateValue::Literal(VariableValue::Real(*x))),
            VarType::Text => Err(err(format!("numeric literal assigned to Text variable ${var}"), line)),
        },
        PUpdateValue::Text(s) => match vtype {
            VarType::Text => {
                if !matches!(op, PUpdateOp::Set) {
                    return Err(err(format!("Text variable ${var} only supports Set"), line));
                }
                Ok(IrUpdateValue::Literal(VariableValue::Text(s.clone())))
            }
            _ => Err(err(format!("text literal assigned to non-Text variable ${var}"), line)),
        },
    }
}

fn lower_speak(speak: &Speak, schema: &VariableSchema) -> Result<Vec<crate::ir::SpeakPart>, CoreError> {
    speak
        .parts
        .iter()
        .map(|p| match p {
            PSpeakPart::Str(s) => Ok(crate::ir::SpeakPart::Literal(s.clone())),
            PSpeakPart::Var(name) => {
                if schema.type_of(name).is_none() {
                    return Err(err(format!("unknown variable ${name} in Speak"), speak.line));
                }
                Ok(crate::ir::SpeakPart::VarRef(name.clone()))
            }
            PSpeakPart::Copy => Ok(crate::ir::SpeakPart::CopyMarker),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sources;

    fn build_src(src: &str) -> Result<(VariableSchema, StateGraph), CoreError> {
        let defs = parse_sources(&[src.to_string()]).unwrap();
        build(defs)
    }

    #[test]
    fn welcome_is_canonicalized_to_index_zero() {
        let (_schema, graph) = build_src(
            r#"State Other
               Default Exit
               State Welcome
               Speak "hi"
               Default Exit"#,
        )
        .unwrap();
        assert_eq!(graph.get(0).name, "Welcome");
        assert!(!graph.get(0).verified);
    }

    #[test]
    fn rejects_missing_welcome() {
        let result = build_src(
            r#"State Other
               Default Exit"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_verified_welcome() {
        let result = build_src(
            r#"State Welcome Verified
               Default Exit"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_state_names() {
        let result = build_src(
            r#"State Welcome
               Default Exit
               State Welcome
               Default Exit"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unresolved_goto() {
        let result = build_src(
            r#"State Welcome
               Default Goto Nowhere"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_update_in_non_verified_state() {
        let result = build_src(
            r#"Variable $balance Int 0
               State Welcome
               Default Update $balance Set 5"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn accepts_update_in_verified_state() {
        let (_schema, graph) = build_src(
            r#"Variable $balance Int 0
               State Welcome
               Default Exit
               State Profile Verified
               Default Update $balance Set 5"#,
        )
        .unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn rejects_copy_into_int_from_text_context() {
        let result = build_src(
            r#"Variable $balance Int 0
               State Welcome
               Default Exit
               State Profile Verified
               Default Update $balance Set Copy"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn accepts_copy_into_int_from_type_int_case() {
        let (_schema, graph) = build_src(
            r#"Variable $balance Int 0
               State Welcome
               Default Exit
               State Profile Verified
               Case Type Int Update $balance Set Copy
               Default Exit"#,
        )
        .unwrap();
        assert_eq!(graph.get(1).cases.len(), 1);
    }

    #[test]
    fn rejects_copy_into_update_inside_timeout() {
        let result = build_src(
            r#"Variable $balance Int 0
               State Welcome
               Default Exit
               State Profile Verified
               Default Exit
               Timeout 60 Update $balance Set Copy"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_text_literal_on_int_variable() {
        let result = build_src(
            r#"Variable $balance Int 0
               State Welcome
               Default Exit
               State Profile Verified
               Default Update $balance Set "oops""#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_variable_in_speak() {
        let result = build_src(
            r#"State Welcome
               Speak $ghost
               Default Exit"#,
        );
        assert!(result.is_err());
    }
}
