//! Class lowering: instance/static fields, private members, static blocks,
//! TypeScript decorators and the `super()` shim.
//!
//! The decision matrix lowers *all* fields of a given static/instance kind
//! whenever any one of them needs lowering, preserving the left-to-right
//! field-initialization order the spec requires.

use super::Lower;
use kestrel_common::CompatFeatures;
use kestrel_parser::ast::*;
use kestrel_parser::symbols::{Ref, SymbolFlags, SymbolKind};

/// How a lowered private name is represented at use sites.
#[derive(Debug, Clone)]
pub(crate) struct PrivateLowering {
    /// The `_name` WeakMap/WeakSet symbol.
    pub brand_ref: Ref,
    pub brand_name: String,
    /// For methods and accessors: the hoisted function symbol(s).
    pub method_fn: Option<(Ref, String)>,
    pub getter_fn: Option<(Ref, String)>,
    pub setter_fn: Option<(Ref, String)>,
    pub is_method: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ClassLoweringInfo {
    use_define_for_class_fields: bool,
    avoid_tdz: bool,
    lower_all_instance_fields: bool,
    lower_all_static_fields: bool,
    lower_static_blocks: bool,
    shim_super_ctor_calls: bool,
    lower_decorators: bool,
}

impl<'a> Lower<'a> {
    fn private_needs_lowering(&self, r: Ref) -> bool {
        if r.source != self.source_index {
            return false;
        }
        let symbol = &self.symbols[r.inner as usize];
        let feature = match symbol.kind {
            SymbolKind::PrivateField => CompatFeatures::CLASS_PRIVATE_FIELD,
            SymbolKind::PrivateMethod => CompatFeatures::CLASS_PRIVATE_METHOD,
            SymbolKind::PrivateGet
            | SymbolKind::PrivateSet
            | SymbolKind::PrivateGetSetPair => CompatFeatures::CLASS_PRIVATE_ACCESSOR,
            SymbolKind::PrivateStaticField => CompatFeatures::CLASS_PRIVATE_STATIC_FIELD,
            SymbolKind::PrivateStaticMethod => CompatFeatures::CLASS_PRIVATE_STATIC_METHOD,
            SymbolKind::PrivateStaticGet
            | SymbolKind::PrivateStaticSet
            | SymbolKind::PrivateStaticGetSetPair => {
                CompatFeatures::CLASS_PRIVATE_STATIC_METHOD
            }
            _ => return false,
        };
        self.unsupported.has(feature)
            || symbol
                .flags
                .contains(SymbolFlags::PRIVATE_SYMBOL_MUST_BE_LOWERED)
    }

    fn compute_lowering_info(&self, class: &Class, is_top_level_stmt: bool) -> ClassLoweringInfo {
        let mut info = ClassLoweringInfo {
            use_define_for_class_fields: self.options.use_define_for_class_fields,
            avoid_tdz: is_top_level_stmt,
            ..ClassLoweringInfo::default()
        };
        for prop in &class.properties {
            let is_private = matches!(prop.key.data, EData::PrivateIdent(_));
            let private_lowered = match &prop.key.data {
                EData::PrivateIdent(p) => self.private_needs_lowering(p.ref_),
                _ => false,
            };
            match prop.kind {
                ClassPropertyKind::Field | ClassPropertyKind::Accessor => {
                    let field_feature = if prop.is_static {
                        CompatFeatures::CLASS_STATIC_FIELD
                    } else {
                        CompatFeatures::CLASS_FIELD
                    };
                    if self.unsupported.has(field_feature) || (is_private && private_lowered) {
                        if prop.is_static {
                            info.lower_all_static_fields = true;
                        } else {
                            info.lower_all_instance_fields = true;
                        }
                    }
                }
                ClassPropertyKind::Method | ClassPropertyKind::Get | ClassPropertyKind::Set => {
                    if is_private && private_lowered {
                        // Lowered private methods brand instances in the
                        // constructor, which drags instance fields along
                        if prop.is_static {
                            info.lower_all_static_fields = true;
                        } else {
                            info.lower_all_instance_fields = true;
                        }
                    }
                }
                ClassPropertyKind::StaticBlock => {
                    if self.unsupported.has(CompatFeatures::CLASS_STATIC_BLOCK) {
                        info.lower_static_blocks = true;
                        info.lower_all_static_fields = true;
                    }
                }
            }
            if !prop.decorators.is_empty()
                || prop.func.as_ref().is_some_and(|f| {
                    f.args.iter().any(|a| !a.decorators.is_empty())
                })
            {
                info.lower_decorators = self.unsupported.has(CompatFeatures::DECORATORS);
            }
        }
        if !class.decorators.is_empty() {
            info.lower_decorators = self.unsupported.has(CompatFeatures::DECORATORS);
        }
        if info.lower_all_instance_fields && class.extends.is_some() {
            info.shim_super_ctor_calls = true;
        }
        info
    }

    // =========================================================================
    // Statement-position classes
    // =========================================================================

    /// Lower a class statement (plain or default-exported). Returns the
    /// replacement statement list.
    pub(crate) fn lower_class_stmt(&mut self, stmt: &mut Stmt) -> Vec<Stmt> {
        let span = stmt.span;
        let (mut class, name_ref, shape) = match std::mem::replace(&mut stmt.data, SData::Empty)
        {
            SData::Class {
                class,
                is_export,
                name_ref,
            } => (class, name_ref, StmtShape::Plain { is_export }),
            SData::ExportDefault(export) => match export.value {
                ExportDefaultValue::Class(class) => {
                    let name_ref = class
                        .name
                        .as_ref()
                        .map(|n| n.ref_)
                        .unwrap_or(export.default_ref);
                    (
                        class,
                        name_ref,
                        StmtShape::Default {
                            default_ref: export.default_ref,
                        },
                    )
                }
                other => {
                    // Not a class; restore and bail
                    stmt.data = SData::ExportDefault(SExportDefault {
                        value: other,
                        default_ref: export.default_ref,
                    });
                    return vec![std::mem::replace(stmt, Stmt::synth(SData::Empty))];
                }
            },
            other => {
                stmt.data = other;
                return vec![std::mem::replace(stmt, Stmt::synth(SData::Empty))];
            }
        };

        let info = self.compute_lowering_info(&class, true);
        // Statement position: the class binding itself is safe to
        // reference from the trailing statements
        debug_assert!(info.avoid_tdz);
        let mut before: Vec<Stmt> = Vec::new();
        let mut after: Vec<Stmt> = Vec::new();
        let class_name = class
            .name
            .as_ref()
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "default".to_string());
        let class_binding = ClassBinding {
            ref_: name_ref,
            name: class_name.clone(),
        };

        self.lower_class_guts(&mut class, &info, &class_binding, &mut before, &mut after);

        let mut out = before;
        match shape {
            StmtShape::Plain { is_export } => {
                out.push(Stmt::new(
                    span,
                    SData::Class {
                        class,
                        is_export,
                        name_ref,
                    },
                ));
            }
            StmtShape::Default { default_ref } => {
                if after.is_empty() {
                    out.push(Stmt::new(
                        span,
                        SData::ExportDefault(SExportDefault {
                            value: ExportDefaultValue::Class(class),
                            default_ref,
                        }),
                    ));
                } else {
                    // Statements follow the class, so the default export
                    // becomes a named class plus `export default` reference
                    out.push(Stmt::new(
                        span,
                        SData::Class {
                            class,
                            is_export: false,
                            name_ref,
                        },
                    ));
                    out.append(&mut after);
                    out.push(Stmt::synth(SData::ExportDefault(SExportDefault {
                        value: ExportDefaultValue::Expr(Expr::ident(name_ref, class_name)),
                        default_ref,
                    })));
                    return out;
                }
            }
        }
        out.append(&mut after);
        out
    }

    /// Lower a class expression in place. Statics that must move out turn
    /// the expression into a comma sequence on a temporary.
    pub(crate) fn lower_class_expr(&mut self, expr: &mut Expr) {
        let EData::Class(class) = &mut expr.data else {
            return;
        };
        let info = self.compute_lowering_info(class, false);
        let needs_rewrite = info.lower_all_instance_fields
            || info.lower_all_static_fields
            || info.lower_static_blocks
            || info.lower_decorators
            || class
                .properties
                .iter()
                .any(|p| matches!(&p.key.data, EData::PrivateIdent(pr) if self.private_needs_lowering(pr.ref_)));

        // Always visit children so nested constructs lower
        if !needs_rewrite {
            let mut class_taken = std::mem::replace(
                class.as_mut(),
                Class {
                    name: None,
                    extends: None,
                    properties: Vec::new(),
                    decorators: Vec::new(),
                },
            );
            self.visit_class_children(&mut class_taken);
            **class = class_taken;
            return;
        }

        let EData::Class(mut class) = std::mem::replace(&mut expr.data, EData::Undefined)
        else {
            return;
        };

        let (temp_ref, temp_name) = self.temp();
        let binding = ClassBinding {
            ref_: temp_ref,
            name: temp_name.clone(),
        };
        let info2 = info;
        let mut before = Vec::new();
        let mut after = Vec::new();
        self.lower_class_guts(&mut class, &info2, &binding, &mut before, &mut after);

        // (_a = class ..., <after as expressions>, _a)
        let mut sequence = Expr::assign(
            Expr::ident(temp_ref, temp_name.clone()),
            Expr::synth(EData::Class(class)),
        );
        for stmt in before.into_iter().chain(after) {
            if let SData::Expr(e) = stmt.data {
                sequence = Expr::synth(EData::Binary(EBinary {
                    op: BinOp::Comma,
                    left: Box::new(sequence),
                    right: Box::new(e),
                }));
            }
        }
        sequence = Expr::synth(EData::Binary(EBinary {
            op: BinOp::Comma,
            left: Box::new(sequence),
            right: Box::new(Expr::ident(temp_ref, temp_name)),
        }));
        expr.data = sequence.data;
    }

    fn visit_class_children(&mut self, class: &mut Class) {
        for decorator in &mut class.decorators {
            self.visit_expr(decorator, false);
        }
        if let Some(extends) = &mut class.extends {
            self.visit_expr(extends, false);
        }
        for prop in &mut class.properties {
            for decorator in &mut prop.decorators {
                self.visit_expr(decorator, false);
            }
            if prop.is_computed {
                self.visit_expr(&mut prop.key, false);
            }
            if let Some(func) = &mut prop.func {
                self.visit_func(func);
            }
            if let Some(initializer) = &mut prop.initializer {
                self.visit_expr(initializer, false);
            }
            if !prop.block.is_empty() {
                let mut block = std::mem::take(&mut prop.block);
                self.visit_stmt_list(&mut block);
                prop.block = block;
            }
        }
    }

    // =========================================================================
    // The shared lowering body
    // =========================================================================

    fn lower_class_guts(
        &mut self,
        class: &mut Class,
        info: &ClassLoweringInfo,
        binding: &ClassBinding,
        before: &mut Vec<Stmt>,
        after: &mut Vec<Stmt>,
    ) {
        // Register lowered private names before visiting bodies so use
        // sites rewrite against them
        let mut branded_instance = false;
        for prop in &class.properties {
            let EData::PrivateIdent(p) = &prop.key.data else {
                continue;
            };
            if !self.private_needs_lowering(p.ref_) {
                continue;
            }
            let private_name = p.name.clone();
            let brand_name = format!("_{private_name}");
            let brand_ref = self.new_symbol(SymbolKind::Injected, &brand_name);
            let is_method_like = matches!(
                prop.kind,
                ClassPropertyKind::Method | ClassPropertyKind::Get | ClassPropertyKind::Set
            );
            let mut lowering = PrivateLowering {
                brand_ref,
                brand_name: brand_name.clone(),
                method_fn: None,
                getter_fn: None,
                setter_fn: None,
                is_method: is_method_like,
            };
            match prop.kind {
                ClassPropertyKind::Method => {
                    let fn_name = format!("{private_name}_fn");
                    let fn_ref = self.new_symbol(SymbolKind::Injected, &fn_name);
                    lowering.method_fn = Some((fn_ref, fn_name));
                }
                ClassPropertyKind::Get => {
                    let fn_name = format!("{private_name}_get");
                    let fn_ref = self.new_symbol(SymbolKind::Injected, &fn_name);
                    lowering.getter_fn = Some((fn_ref, fn_name));
                }
                ClassPropertyKind::Set => {
                    let fn_name = format!("{private_name}_set");
                    let fn_ref = self.new_symbol(SymbolKind::Injected, &fn_name);
                    lowering.setter_fn = Some((fn_ref, fn_name));
                }
                _ => {}
            }
            if is_method_like && !prop.is_static {
                branded_instance = true;
            }
            // Merge accessor pairs onto one brand
            if let Some(existing) = self
                .private_env
                .values_mut()
                .find(|l| l.brand_name == brand_name)
            {
                if lowering.getter_fn.is_some() {
                    existing.getter_fn = lowering.getter_fn.clone();
                }
                if lowering.setter_fn.is_some() {
                    existing.setter_fn = lowering.setter_fn.clone();
                }
                let merged = existing.clone();
                self.private_env.insert(p.ref_, merged);
            } else {
                self.private_env.insert(p.ref_, lowering);
            }
        }

        // Visit children now that the environment is in place
        self.visit_class_children(class);

        // Capture side-effecting computed keys of lowered fields so their
        // side effects keep source order
        for prop in &mut class.properties {
            let will_move = match prop.kind {
                ClassPropertyKind::Field | ClassPropertyKind::Accessor => {
                    if prop.is_static {
                        info.lower_all_static_fields
                    } else {
                        info.lower_all_instance_fields
                    }
                }
                _ => false,
            };
            if will_move && prop.is_computed && prop.key.has_side_effects() {
                let (key_ref, key_name) = self.temp();
                let key = std::mem::replace(&mut prop.key, Expr::ident(key_ref, key_name.clone()));
                before.push(Stmt::expr(Expr::assign(
                    Expr::ident(key_ref, key_name),
                    key,
                )));
            }
        }

        // Split members into kept and lowered
        let mut instance_inits: Vec<Stmt> = Vec::new();
        let mut kept = Vec::with_capacity(class.properties.len());
        for mut prop in class.properties.drain(..) {
            match self.lower_one_member(&mut prop, info, binding, &mut instance_inits, after) {
                true => {}
                false => kept.push(prop),
            }
        }
        class.properties = kept;

        // Brand instances for lowered private methods
        if branded_instance {
            let brands: Vec<(Ref, String)> = {
                let mut seen = Vec::new();
                for lowering in self.private_env.values() {
                    if lowering.is_method
                        && !seen.iter().any(|(r, _)| *r == lowering.brand_ref)
                        && is_instance_brand(lowering)
                    {
                        seen.push((lowering.brand_ref, lowering.brand_name.clone()));
                    }
                }
                seen
            };
            for (brand_ref, brand_name) in brands {
                let add = self.helper("__privateAdd");
                instance_inits.insert(
                    0,
                    Stmt::expr(Expr::call(
                        add,
                        vec![
                            Expr::synth(EData::This),
                            Expr::ident(brand_ref, brand_name),
                        ],
                    )),
                );
            }
        }

        // Move instance initializers into the constructor
        if !instance_inits.is_empty() {
            self.inject_into_constructor(class, instance_inits, info.shim_super_ctor_calls);
        }

        // Decorators, innermost first: members then the class itself
        if info.lower_decorators {
            self.emit_decorators(class, binding, after);
        }

        if self.options.keep_names && (info.lower_decorators || !after.is_empty()) {
            let name_helper = self.helper("__name");
            after.push(Stmt::expr(Expr::call(
                name_helper,
                vec![
                    Expr::ident(binding.ref_, binding.name.clone()),
                    Expr::string(binding.name.clone()),
                ],
            )));
        }
    }

    /// Returns true when the member was removed from the class body.
    fn lower_one_member(
        &mut self,
        prop: &mut ClassProperty,
        info: &ClassLoweringInfo,
        binding: &ClassBinding,
        instance_inits: &mut Vec<Stmt>,
        after: &mut Vec<Stmt>,
    ) -> bool {
        let private = match &prop.key.data {
            EData::PrivateIdent(p) => self.private_env.get(&p.ref_).cloned(),
            _ => None,
        };

        match prop.kind {
            ClassPropertyKind::StaticBlock if info.lower_static_blocks => {
                // The block body runs right after the class binding exists;
                // `this` inside it meant the class
                let mut block = std::mem::take(&mut prop.block);
                rewrite_this_in_stmts(&mut block, binding.ref_, &binding.name);
                after.push(Stmt::expr(Expr::call(
                    Expr::synth(EData::Arrow(Box::new(EArrow {
                        args: Vec::new(),
                        body: ArrowBody::Stmts(block),
                        is_async: false,
                    }))),
                    Vec::new(),
                )));
                true
            }
            ClassPropertyKind::Field | ClassPropertyKind::Accessor => {
                let lower = if prop.is_static {
                    info.lower_all_static_fields
                } else {
                    info.lower_all_instance_fields
                };
                if !lower {
                    return false;
                }
                let is_private = matches!(prop.key.data, EData::PrivateIdent(_));
                if prop.initializer.is_none() && !is_private && !info.use_define_for_class_fields
                {
                    // Assignment semantics: an uninitialised public field
                    // declares nothing
                    return true;
                }
                let init = prop
                    .initializer
                    .take()
                    .unwrap_or_else(Expr::undefined);
                match (&private, prop.is_static) {
                    (Some(lowering), false) => {
                        // __privateAdd(this, _x, init); the WeakMap is
                        // materialised lazily next to the class
                        self.ensure_brand_storage(lowering, after, BrandStorage::WeakMap);
                        let add = self.helper("__privateAdd");
                        instance_inits.push(Stmt::expr(Expr::call(
                            add,
                            vec![
                                Expr::synth(EData::This),
                                Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
                                init,
                            ],
                        )));
                    }
                    (Some(lowering), true) => {
                        self.ensure_brand_storage(lowering, after, BrandStorage::WeakMap);
                        let add = self.helper("__privateAdd");
                        after.push(Stmt::expr(Expr::call(
                            add,
                            vec![
                                Expr::ident(binding.ref_, binding.name.clone()),
                                Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
                                init,
                            ],
                        )));
                    }
                    (None, false) => {
                        // this.key = init
                        let target = self.member_expr(Expr::synth(EData::This), prop);
                        instance_inits.push(Stmt::expr(Expr::assign(target, init)));
                    }
                    (None, true) => {
                        let target = self.member_expr(
                            Expr::ident(binding.ref_, binding.name.clone()),
                            prop,
                        );
                        after.push(Stmt::expr(Expr::assign(target, init)));
                    }
                }
                true
            }
            ClassPropertyKind::Method | ClassPropertyKind::Get | ClassPropertyKind::Set => {
                let Some(lowering) = private else {
                    return false;
                };
                if !matches!(&prop.key.data, EData::PrivateIdent(p)
                    if self.private_needs_lowering(p.ref_))
                {
                    return false;
                }
                // Brand storage: WeakSet for plain methods, WeakMap with
                // get/set for accessors
                let storage = if prop.kind == ClassPropertyKind::Method {
                    BrandStorage::WeakSet
                } else {
                    BrandStorage::WeakMap
                };
                self.ensure_brand_storage(&lowering, after, storage);
                if prop.is_static {
                    let add = self.helper("__privateAdd");
                    after.push(Stmt::expr(Expr::call(
                        add,
                        vec![
                            Expr::ident(binding.ref_, binding.name.clone()),
                            Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
                        ],
                    )));
                }
                // Hoist the implementation function
                let target_fn = match prop.kind {
                    ClassPropertyKind::Method => lowering.method_fn.clone(),
                    ClassPropertyKind::Get => lowering.getter_fn.clone(),
                    _ => lowering.setter_fn.clone(),
                };
                if let Some((fn_ref, fn_name)) = target_fn {
                    if let Some(func) = prop.func.take() {
                        // Assignment (with the var hoisted) so class
                        // expressions can fold this into a comma sequence
                        self.reserve_named_temp(fn_ref, &fn_name);
                        after.push(Stmt::expr(Expr::assign(
                            Expr::ident(fn_ref, fn_name),
                            Expr::synth(EData::Function(Box::new(func))),
                        )));
                    }
                }
                true
            }
            _ => false,
        }
    }

    fn member_expr(&self, target: Expr, prop: &ClassProperty) -> Expr {
        match (&prop.key.data, prop.is_computed) {
            (EData::String(name), false) if kestrel_lexer::js::is_identifier(name) => {
                Expr::dot(target, name.clone())
            }
            _ => Expr::synth(EData::Index(EIndex {
                target: Box::new(target),
                index: Box::new(prop.key.clone()),
                optional_chain: OptionalChain::None,
            })),
        }
    }

    /// Emit `_x = new WeakMap()` / `new WeakSet()` once per brand, placed
    /// right after the class so it exists before any instantiation.
    fn ensure_brand_storage(
        &mut self,
        lowering: &PrivateLowering,
        after: &mut Vec<Stmt>,
        storage: BrandStorage,
    ) {
        let already = after.iter().any(|stmt| match &stmt.data {
            SData::Expr(e) => match &e.data {
                EData::Binary(b) if b.op == BinOp::Assign => {
                    matches!(&b.left.data, EData::Ident(id) if id.ref_ == lowering.brand_ref)
                }
                _ => false,
            },
            _ => false,
        });
        if already {
            return;
        }
        // Reserve the var slot for the brand
        self.reserve_named_temp(lowering.brand_ref, &lowering.brand_name);
        let ctor = match storage {
            BrandStorage::WeakMap => "WeakMap",
            BrandStorage::WeakSet => "WeakSet",
        };
        after.insert(
            0,
            Stmt::expr(Expr::assign(
                Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
                Expr::synth(EData::New(ENew {
                    target: Box::new(Expr::synth(EData::Ident(EIdent {
                        name: ctor.to_string(),
                        ref_: Ref::INVALID,
                    }))),
                    args: Vec::new(),
                })),
            )),
        );
    }

    // =========================================================================
    // Constructor injection and the super() shim
    // =========================================================================

    fn inject_into_constructor(
        &mut self,
        class: &mut Class,
        inits: Vec<Stmt>,
        shim_super: bool,
    ) {
        // Find or create the constructor
        let ctor = class.properties.iter_mut().find(|p| {
            p.kind == ClassPropertyKind::Method
                && !p.is_static
                && matches!(&p.key.data, EData::String(n) if n == "constructor")
        });

        match ctor {
            Some(prop) => {
                let Some(func) = prop.func.as_mut() else {
                    return;
                };
                if !shim_super {
                    splice_after_directives(&mut func.body, inits);
                    return;
                }
                // Count top-level super() calls
                let top_level_supers: Vec<usize> = func
                    .body
                    .iter()
                    .enumerate()
                    .filter_map(|(i, stmt)| match &stmt.data {
                        SData::Expr(e) => match &e.data {
                            EData::Call(call)
                                if matches!(call.target.data, EData::Super) =>
                            {
                                Some(i)
                            }
                            _ => None,
                        },
                        _ => None,
                    })
                    .collect();
                let total_supers = count_super_calls(&func.body);

                if top_level_supers.len() == 1 && total_supers == 1 {
                    // Inline the initializers right after the call
                    let at = top_level_supers[0] + 1;
                    let mut body = std::mem::take(&mut func.body);
                    let tail = body.split_off(at);
                    body.extend(inits);
                    body.extend(tail);
                    func.body = body;
                } else {
                    // __super = (...args) => { super(...args); inits; };
                    // and every super(...) becomes __super(...)
                    let (super_ref, super_name) = self.temp_in_place();
                    let mut shim_body = vec![Stmt::expr(Expr::synth(EData::Call(ECall {
                        target: Box::new(Expr::synth(EData::Super)),
                        args: vec![Expr::synth(EData::Spread(Box::new(Expr::synth(
                            EData::Ident(EIdent {
                                name: "args".to_string(),
                                ref_: Ref::INVALID,
                            }),
                        ))))],
                        optional_chain: OptionalChain::None,
                        is_direct_eval: false,
                    })))];
                    shim_body.extend(inits);
                    let shim = Stmt::synth(SData::Local(SLocal {
                        kind: LocalKind::Var,
                        decls: vec![Decl {
                            binding: Binding::Ident(EIdent {
                                name: super_name.clone(),
                                ref_: super_ref,
                            }),
                            value: Some(Expr::synth(EData::Arrow(Box::new(EArrow {
                                args: vec![Arg {
                                    binding: Binding::Ident(EIdent {
                                        name: "args".to_string(),
                                        ref_: Ref::INVALID,
                                    }),
                                    default: None,
                                    is_rest: true,
                                    decorators: Vec::new(),
                                }],
                                body: ArrowBody::Stmts(shim_body),
                                is_async: false,
                            })))),
                        }],
                        is_export: false,
                    }));
                    rewrite_super_calls(&mut func.body, super_ref, &super_name);
                    splice_after_directives(&mut func.body, vec![shim]);
                }
            }
            None => {
                // Synthesize one
                let mut body = Vec::new();
                let mut args = Vec::new();
                if class.extends.is_some() {
                    args.push(Arg {
                        binding: Binding::Ident(EIdent {
                            name: "args".to_string(),
                            ref_: Ref::INVALID,
                        }),
                        default: None,
                        is_rest: true,
                        decorators: Vec::new(),
                    });
                    body.push(Stmt::expr(Expr::synth(EData::Call(ECall {
                        target: Box::new(Expr::synth(EData::Super)),
                        args: vec![Expr::synth(EData::Spread(Box::new(Expr::synth(
                            EData::Ident(EIdent {
                                name: "args".to_string(),
                                ref_: Ref::INVALID,
                            }),
                        ))))],
                        optional_chain: OptionalChain::None,
                        is_direct_eval: false,
                    }))));
                }
                body.extend(inits);
                class.properties.insert(
                    0,
                    ClassProperty {
                        kind: ClassPropertyKind::Method,
                        is_static: false,
                        is_computed: false,
                        key: Expr::string("constructor"),
                        func: Some(Func {
                            name: None,
                            args,
                            body,
                            is_async: false,
                            is_generator: false,
                            uses_arguments: false,
                        }),
                        initializer: None,
                        block: Vec::new(),
                        decorators: Vec::new(),
                        span: kestrel_common::Span::DUMMY,
                    },
                );
            }
        }
    }

    // =========================================================================
    // Decorators
    // =========================================================================

    fn emit_decorators(&mut self, class: &mut Class, binding: &ClassBinding, after: &mut Vec<Stmt>) {
        // Member decorators first, in declaration order
        for prop in &mut class.properties {
            let mut decorators = std::mem::take(&mut prop.decorators);
            if let Some(func) = &mut prop.func {
                for (i, arg) in func.args.iter_mut().enumerate() {
                    for param_dec in arg.decorators.drain(..) {
                        let helper = self.helper("__decorateParam");
                        decorators.push(Expr::call(
                            helper,
                            vec![Expr::number(i as f64), param_dec],
                        ));
                    }
                }
            }
            if decorators.is_empty() {
                continue;
            }
            let is_field = matches!(
                prop.kind,
                ClassPropertyKind::Field | ClassPropertyKind::Accessor
            );
            let target = if prop.is_static {
                Expr::ident(binding.ref_, binding.name.clone())
            } else {
                Expr::dot(
                    Expr::ident(binding.ref_, binding.name.clone()),
                    "prototype",
                )
            };
            let key = match &prop.key.data {
                EData::String(s) => Expr::string(s.clone()),
                _ => prop.key.clone(),
            };
            let kind = if is_field { 2.0 } else { 1.0 };
            let helper = self.helper("__decorateClass");
            after.push(Stmt::expr(Expr::call(
                helper,
                vec![
                    Expr::synth(EData::Array(decorators)),
                    target,
                    key,
                    Expr::number(kind),
                ],
            )));
        }

        // Then the class decorators (including constructor parameter
        // decorators), official-compiler order
        let mut class_decorators = std::mem::take(&mut class.decorators);
        if let Some(ctor) = class.properties.iter_mut().find(|p| {
            matches!(&p.key.data, EData::String(n) if n == "constructor") && !p.is_static
        }) {
            if let Some(func) = &mut ctor.func {
                for (i, arg) in func.args.iter_mut().enumerate() {
                    for param_dec in arg.decorators.drain(..) {
                        let helper = self.helper("__decorateParam");
                        class_decorators.push(Expr::call(
                            helper,
                            vec![Expr::number(i as f64), param_dec],
                        ));
                    }
                }
            }
        }
        if !class_decorators.is_empty() {
            let helper = self.helper("__decorateClass");
            after.push(Stmt::expr(Expr::assign(
                Expr::ident(binding.ref_, binding.name.clone()),
                Expr::call(
                    helper,
                    vec![
                        Expr::synth(EData::Array(class_decorators)),
                        Expr::ident(binding.ref_, binding.name.clone()),
                    ],
                ),
            )));
        }
    }

    // =========================================================================
    // Private member access rewriting
    // =========================================================================

    /// Rewrite reads, writes, calls, updates and brand checks of lowered
    /// private names. Called for every chain node and from `lower_binary`.
    pub(crate) fn maybe_lower_private_access(&mut self, expr: &mut Expr) {
        // Call of a private method: obj.#m(args)
        if let EData::Call(call) = &expr.data {
            if let EData::Index(index) = &call.target.data {
                if let EData::PrivateIdent(p) = &index.index.data {
                    if let Some(lowering) = self.private_env.get(&p.ref_).cloned() {
                        let EData::Call(mut call) =
                            std::mem::replace(&mut expr.data, EData::Undefined)
                        else {
                            return;
                        };
                        let EData::Index(index) = call.target.data else {
                            return;
                        };
                        let (obj_first, obj_reuse) = self.capture_value(*index.target);
                        let method = self.helper("__privateMethod");
                        let fn_expr = match &lowering.method_fn {
                            Some((r, n)) => Expr::ident(*r, n.clone()),
                            None => match &lowering.getter_fn {
                                Some((r, n)) => Expr::ident(*r, n.clone()),
                                None => Expr::undefined(),
                            },
                        };
                        let bound = Expr::call(
                            method,
                            vec![
                                obj_first,
                                Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
                                fn_expr,
                            ],
                        );
                        let mut args = vec![obj_reuse];
                        args.append(&mut call.args);
                        expr.data = Expr::call(Expr::dot(bound, "call"), args).data;
                        return;
                    }
                }
            }
        }

        // Plain read: obj.#x
        if let EData::Index(index) = &expr.data {
            if let EData::PrivateIdent(p) = &index.index.data {
                if let Some(lowering) = self.private_env.get(&p.ref_).cloned() {
                    let EData::Index(index) =
                        std::mem::replace(&mut expr.data, EData::Undefined)
                    else {
                        return;
                    };
                    let get = self.helper("__privateGet");
                    let mut args = vec![
                        *index.target,
                        Expr::ident(lowering.brand_ref, lowering.brand_name.clone()),
                    ];
                    if let Some((r, n)) = &lowering.getter_fn {
                        args.push(Expr::ident(*r, n.clone()));
                    } else if let Some((r, n)) = &lowering.method_fn {
                        args.push(Expr::ident(*r, n.clone()));
                    }
                    expr.data = Expr::call(get, args).data;
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum BrandStorage {
    WeakMap,
    WeakSet,
}

struct ClassBinding {
    ref_: Ref,
    name: String,
}

enum StmtShape {
    Plain { is_export: bool },
    Default { default_ref: Ref },
}

fn is_instance_brand(lowering: &PrivateLowering) -> bool {
    // Static brands are added directly onto the class, not per instance
    lowering.is_method
}

fn splice_after_directives(body: &mut Vec<Stmt>, stmts: Vec<Stmt>) {
    let at = body
        .iter()
        .position(|s| !matches!(s.data, SData::Directive(_)))
        .unwrap_or(body.len());
    body.splice(at..at, stmts);
}

fn count_super_calls(stmts: &[Stmt]) -> usize {
    // An approximation that never undercounts top-level calls: walk every
    // statement and expression, skipping nested non-arrow functions
    let mut count = 0usize;
    for stmt in stmts {
        count += count_super_in_stmt(stmt);
    }
    count
}

fn count_super_in_stmt(stmt: &Stmt) -> usize {
    match &stmt.data {
        SData::Expr(e) | SData::Throw(e) => count_super_in_expr(e),
        SData::Return(Some(e)) => count_super_in_expr(e),
        SData::Block(stmts) => stmts.iter().map(count_super_in_stmt).sum(),
        SData::If { test, yes, no } => {
            count_super_in_expr(test)
                + count_super_in_stmt(yes)
                + no.as_deref().map_or(0, count_super_in_stmt)
        }
        SData::While { test, body } | SData::DoWhile { test, body } => {
            count_super_in_expr(test) + count_super_in_stmt(body)
        }
        SData::For {
            init,
            test,
            update,
            body,
        } => {
            init.as_deref().map_or(0, count_super_in_stmt)
                + test.as_ref().map_or(0, count_super_in_expr)
                + update.as_ref().map_or(0, count_super_in_expr)
                + count_super_in_stmt(body)
        }
        SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
            count_super_in_stmt(init) + count_super_in_expr(value) + count_super_in_stmt(body)
        }
        SData::Switch { test, cases } => {
            count_super_in_expr(test)
                + cases
                    .iter()
                    .map(|c| {
                        c.value.as_ref().map_or(0, count_super_in_expr)
                            + c.body.iter().map(count_super_in_stmt).sum::<usize>()
                    })
                    .sum::<usize>()
        }
        SData::Try {
            block,
            catch,
            finally,
        } => {
            block.iter().map(count_super_in_stmt).sum::<usize>()
                + catch
                    .as_ref()
                    .map_or(0, |c| c.body.iter().map(count_super_in_stmt).sum())
                + finally
                    .as_ref()
                    .map_or(0, |f| f.iter().map(count_super_in_stmt).sum())
        }
        SData::Label { stmt, .. } => count_super_in_stmt(stmt),
        SData::Local(local) => local
            .decls
            .iter()
            .filter_map(|d| d.value.as_ref())
            .map(count_super_in_expr)
            .sum(),
        _ => 0,
    }
}

fn count_super_in_expr(expr: &Expr) -> usize {
    match &expr.data {
        EData::Call(call) => {
            let own = usize::from(matches!(call.target.data, EData::Super));
            own + count_super_in_expr(&call.target)
                + call.args.iter().map(count_super_in_expr).sum::<usize>()
        }
        EData::Binary(b) => count_super_in_expr(&b.left) + count_super_in_expr(&b.right),
        EData::Unary(u) => count_super_in_expr(&u.value),
        EData::Cond(c) => {
            count_super_in_expr(&c.test)
                + count_super_in_expr(&c.yes)
                + count_super_in_expr(&c.no)
        }
        EData::Dot(d) => count_super_in_expr(&d.target),
        EData::Index(i) => count_super_in_expr(&i.target) + count_super_in_expr(&i.index),
        EData::Array(items) => items.iter().map(count_super_in_expr).sum(),
        EData::Object(props) => props
            .iter()
            .filter_map(|p| p.value.as_ref())
            .map(count_super_in_expr)
            .sum(),
        EData::Spread(e) | EData::Await(e) => count_super_in_expr(e),
        EData::Arrow(arrow) => match &arrow.body {
            // Arrows share the constructor's super binding
            ArrowBody::Expr(e) => count_super_in_expr(e),
            ArrowBody::Stmts(stmts) => stmts.iter().map(count_super_in_stmt).sum(),
        },
        _ => 0,
    }
}

/// Replace `this` with the class binding inside a lowered static block.
/// Nested non-arrow functions keep their own `this`.
fn rewrite_this_in_stmts(stmts: &mut [Stmt], r: Ref, name: &str) {
    struct ThisRewriter {
        r: Ref,
        name: String,
    }
    fn walk_expr(expr: &mut Expr, ctx: &ThisRewriter) {
        if matches!(expr.data, EData::This) {
            expr.data = EData::Ident(EIdent {
                name: ctx.name.clone(),
                ref_: ctx.r,
            });
            return;
        }
        match &mut expr.data {
            EData::Array(items) => items.iter_mut().for_each(|e| walk_expr(e, ctx)),
            EData::Object(props) => {
                for prop in props {
                    if prop.computed {
                        walk_expr(&mut prop.key, ctx);
                    }
                    if let Some(v) = &mut prop.value {
                        if !matches!(v.data, EData::Function(_)) {
                            walk_expr(v, ctx);
                        }
                    }
                }
            }
            EData::Spread(e) | EData::Await(e) => walk_expr(e, ctx),
            EData::Dot(d) => walk_expr(&mut d.target, ctx),
            EData::Index(i) => {
                walk_expr(&mut i.target, ctx);
                walk_expr(&mut i.index, ctx);
            }
            EData::Call(c) => {
                walk_expr(&mut c.target, ctx);
                c.args.iter_mut().for_each(|e| walk_expr(e, ctx));
            }
            EData::New(n) => {
                walk_expr(&mut n.target, ctx);
                n.args.iter_mut().for_each(|e| walk_expr(e, ctx));
            }
            EData::Unary(u) => walk_expr(&mut u.value, ctx),
            EData::Binary(b) => {
                walk_expr(&mut b.left, ctx);
                walk_expr(&mut b.right, ctx);
            }
            EData::Cond(c) => {
                walk_expr(&mut c.test, ctx);
                walk_expr(&mut c.yes, ctx);
                walk_expr(&mut c.no, ctx);
            }
            EData::Arrow(arrow) => match &mut arrow.body {
                ArrowBody::Expr(e) => walk_expr(e, ctx),
                ArrowBody::Stmts(stmts) => stmts.iter_mut().for_each(|s| walk_stmt(s, ctx)),
            },
            EData::Template(t) => {
                if let Some(tag) = &mut t.tag {
                    walk_expr(tag, ctx);
                }
                t.parts.iter_mut().for_each(|p| walk_expr(&mut p.value, ctx));
            }
            _ => {}
        }
    }
    fn walk_stmt(stmt: &mut Stmt, ctx: &ThisRewriter) {
        match &mut stmt.data {
            SData::Expr(e) | SData::Throw(e) => walk_expr(e, ctx),
            SData::Return(Some(e)) => walk_expr(e, ctx),
            SData::Block(stmts) => stmts.iter_mut().for_each(|s| walk_stmt(s, ctx)),
            SData::If { test, yes, no } => {
                walk_expr(test, ctx);
                walk_stmt(yes, ctx);
                if let Some(no) = no {
                    walk_stmt(no, ctx);
                }
            }
            SData::While { test, body } | SData::DoWhile { test, body } => {
                walk_expr(test, ctx);
                walk_stmt(body, ctx);
            }
            SData::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    walk_stmt(init, ctx);
                }
                if let Some(test) = test {
                    walk_expr(test, ctx);
                }
                if let Some(update) = update {
                    walk_expr(update, ctx);
                }
                walk_stmt(body, ctx);
            }
            SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
                walk_stmt(init, ctx);
                walk_expr(value, ctx);
                walk_stmt(body, ctx);
            }
            SData::Local(local) => {
                for decl in &mut local.decls {
                    if let Some(value) = &mut decl.value {
                        walk_expr(value, ctx);
                    }
                }
            }
            SData::Try {
                block,
                catch,
                finally,
            } => {
                block.iter_mut().for_each(|s| walk_stmt(s, ctx));
                if let Some(catch) = catch {
                    catch.body.iter_mut().for_each(|s| walk_stmt(s, ctx));
                }
                if let Some(finally) = finally {
                    finally.iter_mut().for_each(|s| walk_stmt(s, ctx));
                }
            }
            SData::Switch { test, cases } => {
                walk_expr(test, ctx);
                for case in cases {
                    if let Some(value) = &mut case.value {
                        walk_expr(value, ctx);
                    }
                    case.body.iter_mut().for_each(|s| walk_stmt(s, ctx));
                }
            }
            SData::Label { stmt, .. } => walk_stmt(stmt, ctx),
            _ => {}
        }
    }
    let ctx = ThisRewriter {
        r,
        name: name.to_string(),
    };
    for stmt in stmts {
        walk_stmt(stmt, &ctx);
    }
}

fn rewrite_super_calls(stmts: &mut [Stmt], super_ref: Ref, super_name: &str) {
    for stmt in stmts {
        rewrite_super_stmt(stmt, super_ref, super_name);
    }
}

fn rewrite_super_stmt(stmt: &mut Stmt, r: Ref, name: &str) {
    match &mut stmt.data {
        SData::Expr(e) | SData::Throw(e) => rewrite_super_expr(e, r, name),
        SData::Return(Some(e)) => rewrite_super_expr(e, r, name),
        SData::Block(stmts) => rewrite_super_calls(stmts, r, name),
        SData::If { test, yes, no } => {
            rewrite_super_expr(test, r, name);
            rewrite_super_stmt(yes, r, name);
            if let Some(no) = no {
                rewrite_super_stmt(no, r, name);
            }
        }
        SData::While { test, body } | SData::DoWhile { test, body } => {
            rewrite_super_expr(test, r, name);
            rewrite_super_stmt(body, r, name);
        }
        SData::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                rewrite_super_stmt(init, r, name);
            }
            if let Some(test) = test {
                rewrite_super_expr(test, r, name);
            }
            if let Some(update) = update {
                rewrite_super_expr(update, r, name);
            }
            rewrite_super_stmt(body, r, name);
        }
        SData::ForIn { init, value, body } | SData::ForOf { init, value, body, .. } => {
            rewrite_super_stmt(init, r, name);
            rewrite_super_expr(value, r, name);
            rewrite_super_stmt(body, r, name);
        }
        SData::Switch { test, cases } => {
            rewrite_super_expr(test, r, name);
            for case in cases {
                if let Some(value) = &mut case.value {
                    rewrite_super_expr(value, r, name);
                }
                rewrite_super_calls(&mut case.body, r, name);
            }
        }
        SData::Try {
            block,
            catch,
            finally,
        } => {
            rewrite_super_calls(block, r, name);
            if let Some(catch) = catch {
                rewrite_super_calls(&mut catch.body, r, name);
            }
            if let Some(finally) = finally {
                rewrite_super_calls(finally, r, name);
            }
        }
        SData::Label { stmt, .. } => rewrite_super_stmt(stmt, r, name),
        SData::Local(local) => {
            for decl in &mut local.decls {
                if let Some(value) = &mut decl.value {
                    rewrite_super_expr(value, r, name);
                }
            }
        }
        _ => {}
    }
}

fn rewrite_super_expr(expr: &mut Expr, r: Ref, name: &str) {
    if let EData::Call(call) = &mut expr.data {
        if matches!(call.target.data, EData::Super) {
            call.target = Box::new(Expr::ident(r, name));
        }
    }
    match &mut expr.data {
        EData::Call(call) => {
            rewrite_super_expr(&mut call.target, r, name);
            for arg in &mut call.args {
                rewrite_super_expr(arg, r, name);
            }
        }
        EData::Binary(b) => {
            rewrite_super_expr(&mut b.left, r, name);
            rewrite_super_expr(&mut b.right, r, name);
        }
        EData::Unary(u) => rewrite_super_expr(&mut u.value, r, name),
        EData::Cond(c) => {
            rewrite_super_expr(&mut c.test, r, name);
            rewrite_super_expr(&mut c.yes, r, name);
            rewrite_super_expr(&mut c.no, r, name);
        }
        EData::Dot(d) => rewrite_super_expr(&mut d.target, r, name),
        EData::Index(i) => {
            rewrite_super_expr(&mut i.target, r, name);
            rewrite_super_expr(&mut i.index, r, name);
        }
        EData::Array(items) => {
            for item in items {
                rewrite_super_expr(item, r, name);
            }
        }
        EData::Object(props) => {
            for prop in props {
                if let Some(value) = &mut prop.value {
                    rewrite_super_expr(value, r, name);
                }
            }
        }
        EData::Spread(e) | EData::Await(e) => rewrite_super_expr(e, r, name),
        EData::Arrow(arrow) => match &mut arrow.body {
            ArrowBody::Expr(e) => rewrite_super_expr(e, r, name),
            ArrowBody::Stmts(stmts) => rewrite_super_calls(stmts, r, name),
        },
        _ => {}
    }
}
