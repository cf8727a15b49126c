pub mod compiler;
pub mod symbol_table;

pub use compiler::{Bytecode, Compiler};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};

#[cfg(test)]
mod tests {
    use super::*;
    use moss_bytecode::{disassemble, make, Opcode};
    use moss_lexer::Lexer;
    use moss_object::Object;
    use moss_parser::Parser;
    use moss_syntax::ast::Program;
    use std::rc::Rc;

    fn parse(input: &str) -> Program {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize().expect("lexing should succeed");
        let mut parser = Parser::new(tokens);
        parser.parse_program().expect("parsing should succeed")
    }

    fn compile(input: &str) -> Bytecode {
        let mut compiler = Compiler::new();
        compiler
            .compile(&parse(input))
            .unwrap_or_else(|e| panic!("compile error for {:?}: {}", input, e));
        compiler.bytecode()
    }

    fn compile_err(input: &str) -> String {
        let mut compiler = Compiler::new();
        compiler
            .compile(&parse(input))
            .expect_err("compilation should fail")
            .to_string()
    }

    fn concat(parts: Vec<Vec<u8>>) -> Vec<u8> {
        parts.into_iter().flatten().collect()
    }

    fn assert_instructions(input: &str, expected: Vec<Vec<u8>>) {
        let bytecode = compile(input);
        let expected = concat(expected);
        assert_eq!(
            bytecode.instructions,
            expected,
            "wrong instructions for {:?}\nwant:\n{}got:\n{}",
            input,
            disassemble(&expected),
            disassemble(&bytecode.instructions),
        );
    }

    #[test]
    fn integer_arithmetic() {
        assert_instructions(
            "1 + 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1; 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 - 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Sub, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 * 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Mul, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "2 / 1",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Div, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "-1",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Minus, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn boolean_expressions() {
        assert_instructions(
            "true",
            vec![make(Opcode::True, &[]), make(Opcode::Pop, &[])],
        );
        assert_instructions(
            "false",
            vec![make(Opcode::False, &[]), make(Opcode::Pop, &[])],
        );
        assert_instructions(
            "1 > 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 == 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Equal, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 != 2",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::NotEqual, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "true == false",
            vec![
                make(Opcode::True, &[]),
                make(Opcode::False, &[]),
                make(Opcode::Equal, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "!true",
            vec![
                make(Opcode::True, &[]),
                make(Opcode::Bang, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn less_than_reverses_operands() {
        let bytecode = compile("1 < 2");
        assert_eq!(
            bytecode.constants,
            vec![Object::Integer(2), Object::Integer(1)],
            "operands should be compiled right-then-left"
        );
        assert_eq!(
            bytecode.instructions,
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn conditional_without_alternative_produces_null() {
        assert_instructions(
            "if (true) { 10 }; 3333;",
            vec![
                // 0000
                make(Opcode::True, &[]),
                // 0001
                make(Opcode::JumpNotTruthy, &[10]),
                // 0004
                make(Opcode::Constant, &[0]),
                // 0007
                make(Opcode::Jump, &[11]),
                // 0010
                make(Opcode::Null, &[]),
                // 0011
                make(Opcode::Pop, &[]),
                // 0012
                make(Opcode::Constant, &[1]),
                // 0015
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn conditional_with_alternative() {
        assert_instructions(
            "if (true) { 10 } else { 20 }; 3333;",
            vec![
                // 0000
                make(Opcode::True, &[]),
                // 0001
                make(Opcode::JumpNotTruthy, &[10]),
                // 0004
                make(Opcode::Constant, &[0]),
                // 0007
                make(Opcode::Jump, &[13]),
                // 0010
                make(Opcode::Constant, &[1]),
                // 0013
                make(Opcode::Pop, &[]),
                // 0014
                make(Opcode::Constant, &[2]),
                // 0017
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn branch_keeps_only_its_last_value() {
        // The Pop after `1;` stays, the Pop after the trailing `2` is
        // stripped so the branch leaves exactly one value.
        assert_instructions(
            "if (true) { 1; 2 }",
            vec![
                make(Opcode::True, &[]),
                make(Opcode::JumpNotTruthy, &[14]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Jump, &[15]),
                make(Opcode::Null, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn jump_operands_land_on_instruction_boundaries() {
        let bytecode = compile("if (1 < 2) { 10 } else { 20 }; if (true) { 1; 2; 3 }");
        let ins = &bytecode.instructions;
        let mut boundaries = Vec::new();
        let mut i = 0;
        while i < ins.len() {
            boundaries.push(i);
            let op = Opcode::from_u8(ins[i]).expect("valid opcode");
            i += 1 + op.definition().operand_widths.iter().sum::<usize>();
        }
        boundaries.push(ins.len());
        let mut i = 0;
        while i < ins.len() {
            let op = Opcode::from_u8(ins[i]).expect("valid opcode");
            if matches!(op, Opcode::Jump | Opcode::JumpNotTruthy) {
                let target = moss_bytecode::read_u16(&ins[i + 1..]) as usize;
                assert!(
                    boundaries.contains(&target),
                    "jump at {} targets non-boundary {}",
                    i,
                    target
                );
            }
            i += 1 + op.definition().operand_widths.iter().sum::<usize>();
        }
    }

    #[test]
    fn global_let_statements() {
        assert_instructions(
            "let one = 1; let two = 2;",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[1]),
            ],
        );
        assert_instructions(
            "let one = 1; one;",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "let one = 1; let two = one; two;",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::SetGlobal, &[1]),
                make(Opcode::GetGlobal, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn undefined_variables_are_compile_errors() {
        assert_eq!(compile_err("nope"), "undefined variable nope");
        assert_eq!(
            compile_err("let a = 1; a + b"),
            "undefined variable b"
        );
    }

    #[test]
    fn string_expressions() {
        let bytecode = compile(r#""moss""#);
        assert_eq!(
            bytecode.instructions,
            concat(vec![make(Opcode::Constant, &[0]), make(Opcode::Pop, &[])])
        );
        assert_eq!(bytecode.constants, vec![Object::Str(Rc::new("moss".to_string()))]);

        assert_instructions(
            r#""mo" + "ss""#,
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn array_literals() {
        assert_instructions(
            "[]",
            vec![make(Opcode::Array, &[0]), make(Opcode::Pop, &[])],
        );
        assert_instructions(
            "[1, 2, 3]",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Array, &[3]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "[1 + 2, 3 - 4, 5 * 6]",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Sub, &[]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Constant, &[5]),
                make(Opcode::Mul, &[]),
                make(Opcode::Array, &[3]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn hash_literals() {
        assert_instructions(
            "{}",
            vec![make(Opcode::Hash, &[0]), make(Opcode::Pop, &[])],
        );
        assert_instructions(
            "{1: 2, 3: 4, 5: 6}",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Constant, &[5]),
                make(Opcode::Hash, &[6]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "{1: 2 + 3, 4: 5 * 6}",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Add, &[]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Constant, &[5]),
                make(Opcode::Mul, &[]),
                make(Opcode::Hash, &[4]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn index_expressions() {
        assert_instructions(
            "[1, 2, 3][1 + 1]",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Array, &[3]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Add, &[]),
                make(Opcode::Index, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "{1: 2}[2 - 1]",
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Hash, &[2]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Sub, &[]),
                make(Opcode::Index, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn function_literals_compile_to_constants() {
        let bytecode = compile("fn() { 5 + 10 }");
        assert_eq!(
            bytecode.instructions,
            concat(vec![make(Opcode::Constant, &[2]), make(Opcode::Pop, &[])])
        );
        assert_eq!(bytecode.constants[0], Object::Integer(5));
        assert_eq!(bytecode.constants[1], Object::Integer(10));
        let Object::CompiledFunction(func) = &bytecode.constants[2] else {
            panic!("expected compiled function constant");
        };
        assert_eq!(
            func.instructions,
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn explicit_returns_are_not_doubled() {
        let bytecode = compile("fn() { return 5; }");
        let Object::CompiledFunction(func) = &bytecode.constants[1] else {
            panic!("expected compiled function constant");
        };
        assert_eq!(
            func.instructions,
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn valueless_bodies_return_null() {
        let bytecode = compile("fn() { }");
        let Object::CompiledFunction(func) = &bytecode.constants[0] else {
            panic!("expected compiled function constant");
        };
        assert_eq!(
            func.instructions,
            concat(vec![
                make(Opcode::Null, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );

        let bytecode = compile("fn() { let a = 1; }");
        let Object::CompiledFunction(func) = &bytecode.constants[1] else {
            panic!("expected compiled function constant");
        };
        assert_eq!(
            func.instructions,
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Null, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn zero_argument_calls() {
        assert_instructions(
            "fn() { 24 }();",
            vec![
                make(Opcode::Constant, &[1]),
                make(Opcode::Call, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "let noArg = fn() { 24 }; noArg();",
            vec![
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn parameters_and_arguments_are_rejected() {
        assert_eq!(
            compile_err("fn(x) { x }"),
            "functions with parameters are not supported by the compiler yet"
        );
        assert_eq!(
            compile_err("let f = fn() { 1 }; f(2)"),
            "call arguments are not supported by the compiler yet"
        );
    }

    #[test]
    fn constants_pool_is_append_only_across_compiles() {
        // compile(X); compile(Y) must leave the same pool as
        // compile(X; Y).
        let mut split = Compiler::new();
        split.compile(&parse("1 + 2;")).unwrap();
        split.compile(&parse("\"a\"; [3, 4];")).unwrap();
        let combined = compile("1 + 2; \"a\"; [3, 4];");
        assert_eq!(split.bytecode().constants, combined.constants);
    }

    #[test]
    fn repeated_compiles_append_instructions() {
        let mut compiler = Compiler::new();
        compiler.compile(&parse("1;")).unwrap();
        let first_len = compiler.bytecode().instructions.len();
        compiler.compile(&parse("2;")).unwrap();
        let bytecode = compiler.bytecode();
        assert!(bytecode.instructions.len() > first_len);
        assert_eq!(
            bytecode.instructions,
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn state_survives_a_round_trip() {
        let mut first = Compiler::new();
        first.compile(&parse("let x = 1;")).unwrap();
        let (symbols, constants) = first.into_state();

        let mut second = Compiler::new_with_state(symbols, constants);
        second.compile(&parse("x + 2;")).unwrap();
        let bytecode = second.bytecode();
        assert_eq!(
            bytecode.instructions,
            concat(vec![
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
        assert_eq!(
            bytecode.constants,
            vec![Object::Integer(1), Object::Integer(2)]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let input = r#"let a = if (1 < 2) { "x" } else { "y" }; [a, {1: 2}][0]"#;
        let first = compile(input);
        let second = compile(input);
        assert_eq!(first.instructions, second.instructions);
        assert_eq!(first.constants, second.constants);
    }
}
