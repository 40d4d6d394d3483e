//! Tests for the Python parser

#[cfg(test)]
mod parser_tests {
    use crate::parser::{parse, ParseError, PythonParser};
    use crate::tree::{Body, Node, ParameterKind};

    #[test]
    fn test_create_parser() {
        assert!(PythonParser::new().is_ok());
    }

    #[test]
    fn test_parse_simple_function() {
        let src = "def simple_function(x):\n    return x + 1\n";
        let tree = parse(src).unwrap();
        let functions = tree.functions();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "simple_function");
        assert_eq!(functions[0].parameters.text, "(x)");
        assert_eq!(functions[0].body_indent, "    ");
        assert!(!functions[0].is_async);
    }

    #[test]
    fn test_parse_empty_file() {
        let tree = parse("").unwrap();
        assert!(tree.module().is_empty());
        assert!(tree.functions().is_empty());
    }

    #[test]
    fn test_parse_rejects_syntax_error() {
        let err = parse("def broken(x)\n    return x\n").unwrap_err();
        assert!(
            matches!(err, ParseError::Syntax { line: 1, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_parse_rejects_unbalanced_parens() {
        let result = parse("x = (1, 2\n");
        assert!(result.is_err(), "unterminated tuple should not parse");
    }

    #[test]
    fn test_parse_strips_bom() {
        let tree = parse("\u{feff}def f():\n    pass\n").unwrap();
        assert!(tree.source().starts_with("def"));
        assert_eq!(tree.functions()[0].name, "f");
    }

    #[test]
    fn test_module_statements_keep_source_order() {
        let src = "import os\n\nX = 1\n\ndef f():\n    pass\n\nclass C:\n    pass\n";
        let tree = parse(src).unwrap();
        let kinds: Vec<&str> = tree.module().iter().map(|n| n.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "import_statement",
                "expression_statement",
                "function_definition",
                "class_definition"
            ]
        );
    }

    #[test]
    fn test_parse_async_function() {
        let src = "async def fetch(url):\n    return await get(url)\n";
        let tree = parse(src).unwrap();
        let functions = tree.functions();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "fetch");
        assert!(functions[0].is_async);
    }

    #[test]
    fn test_parse_decorated_function_span_includes_decorators() {
        let src = "@cache\n@trace(level=2)\ndef f(a):\n    return a\n";
        let tree = parse(src).unwrap();
        let f = tree.functions()[0];
        assert_eq!(f.decorators.len(), 2);
        assert_eq!(f.decorators[0].text, "@cache");
        assert_eq!(f.decorators[1].text, "@trace(level=2)");
        assert_eq!(f.span.start, 0);
        assert_eq!(f.span.start_line, 1);
        assert_eq!(f.header.start_line, 3);
        assert_eq!(&src[f.header.start..f.header.end], "def f(a):");
    }

    #[test]
    fn test_parse_return_annotation() {
        let src = "def total(xs: list[int]) -> int:\n    return sum(xs)\n";
        let tree = parse(src).unwrap();
        let f = tree.functions()[0];
        assert_eq!(f.returns.as_ref().map(|r| r.text.as_str()), Some("int"));
        assert_eq!(f.parameters.params[0].annotation.as_deref(), Some("list[int]"));
    }

    #[test]
    fn test_parameter_kinds() {
        let src = "def f(a, b=1, /, c: int = 2, *args, d, e=3, **kwargs):\n    pass\n";
        let tree = parse(src).unwrap();
        let params = &tree.functions()[0].parameters.params;
        let summary: Vec<(&str, ParameterKind)> =
            params.iter().map(|p| (p.name.as_str(), p.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("a", ParameterKind::PositionalOnly),
                ("b", ParameterKind::PositionalOnly),
                ("c", ParameterKind::PositionalOrKeyword),
                ("args", ParameterKind::VarPositional),
                ("d", ParameterKind::KeywordOnly),
                ("e", ParameterKind::KeywordOnly),
                ("kwargs", ParameterKind::VarKeyword),
            ]
        );
        assert_eq!(params[1].default.as_deref(), Some("1"));
        assert_eq!(params[2].annotation.as_deref(), Some("int"));
        assert_eq!(params[2].default.as_deref(), Some("2"));
    }

    #[test]
    fn test_bare_star_makes_keyword_only() {
        let src = "def f(x, *, key):\n    pass\n";
        let tree = parse(src).unwrap();
        let params = &tree.functions()[0].parameters.params;
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].kind, ParameterKind::PositionalOrKeyword);
        assert_eq!(params[1].kind, ParameterKind::KeywordOnly);
    }

    #[test]
    fn test_typed_splat_parameters() {
        let src = "def f(*args: int, **kwargs: str):\n    pass\n";
        let tree = parse(src).unwrap();
        let params = &tree.functions()[0].parameters.params;
        assert_eq!(params[0].name, "args");
        assert_eq!(params[0].kind, ParameterKind::VarPositional);
        assert_eq!(params[1].name, "kwargs");
        assert_eq!(params[1].kind, ParameterKind::VarKeyword);
    }

    #[test]
    fn test_class_methods_are_nested() {
        let src = "class MyClass(Base):\n    def method_one(self, x):\n        return x + 1\n\n    def method_two(self):\n        return 42\n";
        let tree = parse(src).unwrap();
        let Node::ClassDef(class) = tree.module().iter().next().unwrap() else {
            panic!("expected a class");
        };
        assert_eq!(class.name, "MyClass");
        assert_eq!(class.bases.as_deref(), Some("(Base)"));
        assert_eq!(class.body.len(), 2);

        let names: Vec<&str> = tree.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["method_one", "method_two"]);
        assert_eq!(tree.functions()[0].body_indent, "        ");
    }

    #[test]
    fn test_compound_statements_own_blocks() {
        let src = "if DEBUG:\n    def f():\n        pass\nelse:\n    def g():\n        pass\n";
        let tree = parse(src).unwrap();
        let Node::Compound(compound) = tree.module().iter().next().unwrap() else {
            panic!("expected a compound statement");
        };
        assert_eq!(compound.kind, "if_statement");
        assert_eq!(compound.suites.len(), 2);
        let names: Vec<&str> = tree.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["f", "g"]);
    }

    #[test]
    fn test_body_dump_skips_comments() {
        let src = "def f(x):\n    # double it\n    y = x * 2\n    return y\n";
        let tree = parse(src).unwrap();
        let dump = tree.functions()[0].body.dump();
        assert_eq!(dump.len(), 2);
        assert!(dump[0].starts_with("(expression_statement"), "{}", dump[0]);
        assert!(dump[1].starts_with("(return_statement"), "{}", dump[1]);
    }

    #[test]
    fn test_inline_body_indent() {
        let src = "class C:\n    def f(self): return 1\n";
        let tree = parse(src).unwrap();
        let f = tree.functions()[0];
        assert_eq!(f.body_indent, "        ");
        assert_eq!(&src[f.body_span.start..f.body_span.end], "return 1");
    }

    #[test]
    fn test_body_span_excludes_trailing_whitespace() {
        let src = "def f():\n    return 1\n\n\nx = 2\n";
        let tree = parse(src).unwrap();
        let f = tree.functions()[0];
        assert_eq!(&src[f.body_span.start..f.body_span.end], "return 1");
        assert_eq!(f.body_span.start_line, 2);
        assert_eq!(f.body_span.end_line, 2);
        assert!(matches!(f.body, Body::Source { .. }));
    }
}
