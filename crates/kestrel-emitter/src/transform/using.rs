//! Explicit resource management (`using` / `await using`) lowering.
//!
//! All `using` declarations of one block collect into a single synthesized
//! try/catch/finally: acquisitions push onto a disposal stack and
//! `__callDispose` unwinds it in reverse order, even on throw. When any
//! `await using` participates, the finally conditionally awaits the promise
//! `__callDispose` returns.

use super::Lower;
use kestrel_parser::ast::*;
use kestrel_parser::symbols::Ref;

impl<'a> Lower<'a> {
    /// Rewrite a statement list whose top level contains `using`
    /// declarations. Statements before the first `using` stay put; the
    /// rest moves into the protected region.
    pub(crate) fn lower_using_in_list(&mut self, stmts: &mut Vec<Stmt>) {
        let first = stmts.iter().position(|s| {
            matches!(&s.data, SData::Local(local) if local.kind.is_using())
        });
        let Some(first) = first else {
            return;
        };

        let at_top_level = self.at_module_top_level();
        let mut tail: Vec<Stmt> = stmts.split_off(first);
        let (stack, has_await) = self.rewrite_using_decls(&mut tail, at_top_level);
        let harness = self.build_using_harness(tail, stack, has_await);
        stmts.extend(harness);
    }

    /// A switch with `using` in any case shares one lowering context that
    /// spans the whole switch.
    pub(crate) fn lower_using_in_switch(&mut self, stmt: &mut Stmt) {
        let has_using = match &stmt.data {
            SData::Switch { cases, .. } => cases.iter().any(|c| {
                c.body
                    .iter()
                    .any(|s| matches!(&s.data, SData::Local(l) if l.kind.is_using()))
            }),
            _ => false,
        };
        if !has_using {
            return;
        }

        let (stack_ref, stack_name) = self.temp();
        let mut has_await = false;
        if let SData::Switch { cases, .. } = &mut stmt.data {
            for case in cases.iter_mut() {
                let mut body = std::mem::take(&mut case.body);
                let (_, case_await) = self.rewrite_using_decls_with_stack(
                    &mut body,
                    (stack_ref, stack_name.clone()),
                    true, // bindings hoist out of the try, so use var
                );
                has_await |= case_await;
                case.body = body;
            }
        }
        let switch_stmt = std::mem::replace(stmt, Stmt::synth(SData::Empty));
        let harness =
            self.build_using_harness(vec![switch_stmt], (stack_ref, stack_name), has_await);
        *stmt = Stmt::synth(SData::Block(harness));
    }

    /// `for (using x of y)` becomes a loop over a temporary whose body
    /// opens with a fresh `using` of the original name.
    pub(crate) fn lower_for_of_using(&mut self, stmt: &mut Stmt) {
        let SData::ForOf { init, body, .. } = &mut stmt.data else {
            return;
        };
        let SData::Local(local) = &mut init.data else {
            return;
        };
        if !local.kind.is_using() {
            return;
        }
        let using_kind = local.kind;
        let Some(decl) = local.decls.first_mut() else {
            return;
        };
        let original_binding = std::mem::replace(
            &mut decl.binding,
            Binding::Ident(EIdent {
                name: String::new(),
                ref_: Ref::INVALID,
            }),
        );

        // Loop over a fresh temporary instead
        let (loop_ref, loop_name) = self.temp_in_place();
        decl.binding = Binding::Ident(EIdent {
            name: loop_name.clone(),
            ref_: loop_ref,
        });
        local.kind = LocalKind::Const;

        // Body opens with `using <original> = <temp>` and then lowers
        let mut new_body = vec![Stmt::synth(SData::Local(SLocal {
            kind: using_kind,
            decls: vec![Decl {
                binding: original_binding,
                value: Some(Expr::ident(loop_ref, loop_name)),
            }],
            is_export: false,
        }))];
        match std::mem::replace(body.as_mut(), Stmt::synth(SData::Empty)).data {
            SData::Block(stmts) => new_body.extend(stmts),
            other => new_body.push(Stmt::synth(other)),
        }
        self.lower_using_in_list(&mut new_body);
        **body = Stmt::synth(SData::Block(new_body));
    }

    // =========================================================================
    // Shared pieces
    // =========================================================================

    fn rewrite_using_decls(
        &mut self,
        stmts: &mut [Stmt],
        force_var: bool,
    ) -> ((Ref, String), bool) {
        let stack = self.temp();
        let (_, has_await) =
            self.rewrite_using_decls_with_stack(stmts, stack.clone(), force_var);
        (stack, has_await)
    }

    /// Turn `using x = expr` into `<kind> x = __using(_stack, expr[, true])`.
    fn rewrite_using_decls_with_stack(
        &mut self,
        stmts: &mut [Stmt],
        stack: (Ref, String),
        force_var: bool,
    ) -> ((Ref, String), bool) {
        let mut has_await = false;
        for stmt in stmts.iter_mut() {
            let SData::Local(local) = &mut stmt.data else {
                continue;
            };
            if !local.kind.is_using() {
                continue;
            }
            let is_async = local.kind == LocalKind::AwaitUsing;
            has_await |= is_async;
            for decl in &mut local.decls {
                let value = decl.value.take().unwrap_or_else(Expr::undefined);
                let helper = self.helper("__using");
                let mut args = vec![Expr::ident(stack.0, stack.1.clone()), value];
                if is_async {
                    args.push(Expr::synth(EData::Boolean(true)));
                }
                decl.value = Some(Expr::call(helper, args));
            }
            local.kind = if force_var {
                LocalKind::Var
            } else {
                LocalKind::Const
            };
            // In bundle output the export set is tracked separately; the
            // rewritten declaration itself is plain
            local.is_export = false;
        }
        (stack, has_await)
    }

    /// Build:
    /// ```text
    /// var _stack = [];
    /// try { <tail> }
    /// catch (_caught) { _error = _caught; _hasError = true; }
    /// finally { <dispose>; }
    /// ```
    fn build_using_harness(
        &mut self,
        tail: Vec<Stmt>,
        stack: (Ref, String),
        has_await: bool,
    ) -> Vec<Stmt> {
        let (error_ref, error_name) = self.temp();
        let (has_error_ref, has_error_name) = self.temp();
        let (caught_ref, caught_name) = self.temp_in_place();

        let preamble = Stmt::expr(Expr::assign(
            Expr::ident(stack.0, stack.1.clone()),
            Expr::synth(EData::Array(Vec::new())),
        ));

        let catch = Catch {
            binding: Some(Binding::Ident(EIdent {
                name: caught_name.clone(),
                ref_: caught_ref,
            })),
            body: vec![
                Stmt::expr(Expr::assign(
                    Expr::ident(error_ref, error_name.clone()),
                    Expr::ident(caught_ref, caught_name),
                )),
                Stmt::expr(Expr::assign(
                    Expr::ident(has_error_ref, has_error_name.clone()),
                    Expr::synth(EData::Boolean(true)),
                )),
            ],
        };

        let dispose_helper = self.helper("__callDispose");
        let dispose_call = Expr::call(
            dispose_helper,
            vec![
                Expr::ident(stack.0, stack.1),
                Expr::ident(error_ref, error_name),
                Expr::ident(has_error_ref, has_error_name),
            ],
        );
        let finally = if has_await {
            // var _promise = __callDispose(...); _promise && await _promise
            let (promise_ref, promise_name) = self.temp();
            vec![
                Stmt::expr(Expr::assign(
                    Expr::ident(promise_ref, promise_name.clone()),
                    dispose_call,
                )),
                Stmt::expr(Expr::synth(EData::Binary(EBinary {
                    op: BinOp::LogicalAnd,
                    left: Box::new(Expr::ident(promise_ref, promise_name.clone())),
                    right: Box::new(Expr::synth(EData::Await(Box::new(Expr::ident(
                        promise_ref,
                        promise_name,
                    ))))),
                }))),
            ]
        } else {
            vec![Stmt::expr(dispose_call)]
        };

        vec![
            preamble,
            Stmt::synth(SData::Try {
                block: tail,
                catch: Some(catch),
                finally: Some(finally),
            }),
        ]
    }
}
