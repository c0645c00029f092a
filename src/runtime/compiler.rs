//! Name resolution and lowering from [`Exp`] to [`Node`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::ir::Node;
use super::parser::{Exp, Span, Stmt};
use crate::violation::Violation;

/// Capture name of a top-level expression.
pub const ANONYMOUS_CAPTURE: &str = "*";

/// A compiled binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub node: Arc<Node>,
    pub alias: bool,
    pub local: bool,
    /// Type name reported in match output (`name` or `pkg.name`).
    pub capture_name: Arc<str>,
}

impl Binding {
    /// The node a reference to this binding lowers to.
    pub fn reference(&self) -> Node {
        if self.alias {
            Node::Call(Arc::clone(&self.node))
        } else {
            Node::Capture {
                name: Arc::clone(&self.capture_name),
                node: Arc::clone(&self.node),
            }
        }
    }
}

#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub origin: Option<String>,
    pub bindings: HashMap<String, Binding>,
    /// Heap bytes charged for this package.
    pub weight: usize,
}

struct PendingBinding<'a> {
    exp: &'a Exp,
    alias: bool,
    local: bool,
    span: Span,
}

/// Lowers one block or one expression against a fixed environment.
pub struct Compiler<'a> {
    src: &'a str,
    origin: Option<&'a str>,
    package: Option<&'a str>,
    outer: &'a HashMap<String, Binding>,
    imports: &'a HashMap<String, Arc<Package>>,
    pending: HashMap<String, PendingBinding<'a>>,
    compiled: HashMap<String, Binding>,
    in_progress: Vec<String>,
    failed: HashSet<String>,
    violations: Vec<Violation>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        src: &'a str,
        outer: &'a HashMap<String, Binding>,
        imports: &'a HashMap<String, Arc<Package>>,
    ) -> Self {
        Self {
            src,
            origin: None,
            package: None,
            outer,
            imports,
            pending: HashMap::new(),
            compiled: HashMap::new(),
            in_progress: Vec::new(),
            failed: HashSet::new(),
            violations: Vec::new(),
        }
    }

    pub fn with_origin(mut self, origin: Option<&'a str>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_package(mut self, package: Option<&'a str>) -> Self {
        self.package = package;
        self
    }

    fn violation(&mut self, who: &str, message: String, span: Span) {
        let mut v = Violation::error(who, message).with_source(self.src, span.start + 1, span.end + 1);
        if let Some(origin) = self.origin {
            v = v.with_origin(origin);
        }
        self.violations.push(v);
    }

    fn warning(&mut self, message: String, span: Span) {
        let mut v =
            Violation::warning("compiler", message).with_source(self.src, span.start + 1, span.end + 1);
        if let Some(origin) = self.origin {
            v = v.with_origin(origin);
        }
        self.violations.push(v);
    }

    /// Compile every binding of a block. Returns the new bindings in
    /// definition order together with all violations.
    pub fn compile_block(mut self, stmts: &'a [Stmt]) -> (Vec<(String, Binding)>, Vec<Violation>) {
        let mut order = Vec::new();
        for stmt in stmts {
            if let Stmt::Binding {
                name,
                exp,
                alias,
                local,
                span,
            } = stmt
            {
                if self.pending.contains_key(name) {
                    self.violation(
                        "compiler",
                        format!("identifier '{name}' is bound more than once in this block"),
                        *span,
                    );
                    continue;
                }
                if self.package.is_none() && self.outer.contains_key(name) {
                    self.warning(format!("reassignment to identifier '{name}'"), *span);
                }
                self.pending.insert(
                    name.clone(),
                    PendingBinding {
                        exp,
                        alias: *alias,
                        local: *local,
                        span: *span,
                    },
                );
                order.push(name.clone());
            }
        }

        for name in &order {
            self.compile_binding(name);
        }

        let mut out = Vec::with_capacity(order.len());
        for name in order {
            if let Some(binding) = self.compiled.remove(&name) {
                out.push((name, binding));
            }
        }
        (out, self.violations)
    }

    /// Compile a top-level expression into a capturing node.
    pub fn compile_expression(mut self, exp: &'a Exp) -> (Option<Node>, Vec<Violation>) {
        let top = match exp {
            Exp::Ref { .. } => match self.lower(exp) {
                Some(node @ Node::Capture { .. }) => Some(node),
                Some(node) => Some(anonymous(node)),
                None => None,
            },
            _ => self.lower(exp).map(anonymous),
        };
        if let Some(node) = &top {
            if node.nullable() {
                let span = Span {
                    start: 0,
                    end: self.src.len(),
                };
                self.warning("pattern can match the empty string".to_string(), span);
            }
        }
        if self.violations.iter().any(Violation::is_error) {
            return (None, self.violations);
        }
        (top, self.violations)
    }

    fn compile_binding(&mut self, name: &str) -> Option<Binding> {
        if let Some(binding) = self.compiled.get(name) {
            return Some(binding.clone());
        }
        if self.failed.contains(name) {
            return None;
        }
        let pending = self.pending.get(name)?;
        let (exp, alias, local, span) = (pending.exp, pending.alias, pending.local, pending.span);
        if self.in_progress.iter().any(|n| n == name) {
            let chain = self.in_progress.join(" -> ");
            self.violation(
                "compiler",
                format!("recursive binding: {chain} -> {name}"),
                span,
            );
            return None;
        }
        self.in_progress.push(name.to_string());
        let lowered = self.lower(exp);
        self.in_progress.pop();

        let Some(node) = lowered else {
            self.failed.insert(name.to_string());
            return None;
        };
        let capture_name: Arc<str> = match self.package {
            Some(pkg) => Arc::from(format!("{pkg}.{name}")),
            None => Arc::from(name),
        };
        let binding = Binding {
            node: Arc::new(node),
            alias,
            local,
            capture_name,
        };
        self.compiled.insert(name.to_string(), binding.clone());
        Some(binding)
    }

    fn resolve(&mut self, package: Option<&str>, name: &str, span: Span) -> Option<Node> {
        match package {
            None => {
                if self.pending.contains_key(name) {
                    return self.compile_binding(name).map(|b| b.reference());
                }
                if let Some(binding) = self.outer.get(name) {
                    return Some(binding.reference());
                }
                if name == "halt" {
                    return Some(Node::Halt);
                }
                self.violation("compiler", format!("unbound identifier '{name}'"), span);
                None
            }
            Some(pkg) => {
                let imports = self.imports;
                let Some(package) = imports.get(pkg) else {
                    self.violation(
                        "compiler",
                        format!("undefined package '{pkg}' (not imported)"),
                        span,
                    );
                    return None;
                };
                match package.bindings.get(name) {
                    Some(binding) if !binding.local => Some(binding.reference()),
                    Some(_) => {
                        self.violation(
                            "compiler",
                            format!("'{pkg}.{name}' is local to package {}", package.name),
                            span,
                        );
                        None
                    }
                    None => {
                        self.violation(
                            "compiler",
                            format!("unbound identifier '{pkg}.{name}'"),
                            span,
                        );
                        None
                    }
                }
            }
        }
    }

    fn lower(&mut self, exp: &Exp) -> Option<Node> {
        Some(match exp {
            Exp::Literal(bytes) => Node::Literal(bytes.clone().into_boxed_slice()),
            Exp::Set(set) => Node::Set(set.clone()),
            Exp::Any => Node::Any,
            Exp::Start => Node::Start,
            Exp::End => Node::End,
            Exp::Boundary => Node::Boundary,
            Exp::Ref {
                package,
                name,
                span,
            } => return self.resolve(package.as_deref(), name, *span),
            Exp::Seq { items, cooked } => {
                let mut nodes = Vec::with_capacity(items.len() * 2);
                let mut ok = true;
                for (i, item) in items.iter().enumerate() {
                    let lowered = self.lower(item);
                    let Some(node) = lowered else {
                        ok = false;
                        continue;
                    };
                    let previous_is_predicate =
                        i > 0 && matches!(items[i - 1], Exp::Not(_) | Exp::Look(_));
                    if *cooked && i > 0 && !previous_is_predicate {
                        nodes.push(Node::Boundary);
                    }
                    nodes.push(node);
                }
                if !ok {
                    return None;
                }
                Node::Seq(nodes)
            }
            Exp::Choice(alternatives) => {
                let lowered: Vec<Option<Node>> =
                    alternatives.iter().map(|alt| self.lower(alt)).collect();
                Node::Choice(lowered.into_iter().collect::<Option<Vec<_>>>()?)
            }
            Exp::Repeat {
                exp,
                min,
                max,
                cooked,
            } => Node::Repeat {
                node: Box::new(self.lower(exp)?),
                min: *min,
                max: *max,
                boundary: *cooked,
            },
            Exp::Not(exp) => Node::Not(Box::new(self.lower(exp)?)),
            Exp::Look(exp) => Node::Look(Box::new(self.lower(exp)?)),
        })
    }
}

fn anonymous(node: Node) -> Node {
    Node::Capture {
        name: Arc::from(ANONYMOUS_CAPTURE),
        node: Arc::new(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::parser::{parse_block, parse_expression};

    fn block(src: &str) -> (Vec<(String, Binding)>, Vec<Violation>) {
        let stmts = parse_block(src).unwrap();
        let outer = HashMap::new();
        let imports = HashMap::new();
        Compiler::new(src, &outer, &imports).compile_block(&stmts)
    }

    #[test]
    fn test_block_with_forward_reference() {
        let (bindings, violations) = block("pair = d d\nalias d = [:digit:]");
        assert!(violations.is_empty(), "{violations:?}");
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].0, "pair");
        assert!(!bindings[0].1.alias);
        assert!(bindings[1].1.alias);
    }

    #[test]
    fn test_recursion_is_a_violation() {
        let (_, violations) = block("a = \"x\" b\nb = \"y\" a");
        assert!(violations
            .iter()
            .any(|v| v.is_error() && v.message.contains("recursive binding")));
    }

    #[test]
    fn test_duplicate_binding() {
        let (_, violations) = block("a = \"x\"\na = \"y\"");
        assert!(violations.iter().any(|v| v.message.contains("more than once")));
    }

    #[test]
    fn test_package_capture_names() {
        let src = "int = [:digit:]+";
        let stmts = parse_block(src).unwrap();
        let outer = HashMap::new();
        let imports = HashMap::new();
        let (bindings, _) = Compiler::new(src, &outer, &imports)
            .with_package(Some("num"))
            .compile_block(&stmts);
        assert_eq!(&*bindings[0].1.capture_name, "num.int");
    }

    #[test]
    fn test_expression_against_package() {
        let src = "int = [:digit:]+\nlocal hidden = \"h\"";
        let stmts = parse_block(src).unwrap();
        let outer = HashMap::new();
        let no_imports = HashMap::new();
        let (bindings, _) = Compiler::new(src, &outer, &no_imports)
            .with_package(Some("num"))
            .compile_block(&stmts);
        let package = Package {
            name: "num".to_string(),
            origin: None,
            bindings: bindings.into_iter().collect(),
            weight: 0,
        };
        let mut imports = HashMap::new();
        imports.insert("num".to_string(), Arc::new(package));

        let exp = parse_expression("num.int").unwrap();
        let (node, violations) = Compiler::new("num.int", &outer, &imports).compile_expression(&exp);
        assert!(violations.is_empty());
        match node {
            Some(Node::Capture { name, .. }) => assert_eq!(&*name, "num.int"),
            other => panic!("unexpected {other:?}"),
        }

        let exp = parse_expression("num.hidden").unwrap();
        let (node, violations) =
            Compiler::new("num.hidden", &outer, &imports).compile_expression(&exp);
        assert!(node.is_none());
        assert!(violations[0].message.contains("local to package"));

        let exp = parse_expression("net.ip").unwrap();
        let (node, violations) = Compiler::new("net.ip", &outer, &imports).compile_expression(&exp);
        assert!(node.is_none());
        assert!(violations[0].message.contains("undefined package"));
    }

    #[test]
    fn test_empty_match_warning() {
        let outer = HashMap::new();
        let imports = HashMap::new();
        let exp = parse_expression("\"a\"?").unwrap();
        let (node, violations) = Compiler::new("\"a\"?", &outer, &imports).compile_expression(&exp);
        assert!(node.is_some());
        assert_eq!(violations.len(), 1);
        assert!(!violations[0].is_error());
    }

    #[test]
    fn test_unbound_identifier() {
        let outer = HashMap::new();
        let imports = HashMap::new();
        let exp = parse_expression("nosuchthing").unwrap();
        let (node, violations) =
            Compiler::new("nosuchthing", &outer, &imports).compile_expression(&exp);
        assert!(node.is_none());
        assert_eq!(violations[0].who, "compiler");
        assert_eq!(violations[0].source.as_ref().map(|s| s.s), Some(1));
    }

    #[test]
    fn test_cooked_sequence_inserts_boundaries() {
        let outer = HashMap::new();
        let imports = HashMap::new();
        let exp = parse_expression("\"a\" \"b\" {\"c\" \"d\"}").unwrap();
        let (node, _) = Compiler::new("", &outer, &imports).compile_expression(&exp);
        let Some(Node::Capture { node, .. }) = node else {
            panic!("expected capture");
        };
        let Node::Seq(items) = &*node else {
            panic!("expected sequence");
        };
        assert!(matches!(items[1], Node::Boundary));
        assert!(matches!(items[3], Node::Boundary));
        let Node::Seq(raw) = &items[4] else {
            panic!("expected raw sequence");
        };
        assert_eq!(raw.len(), 2);
    }
}
