//! Bytecode definitions and the line-oriented text format.
//!
//! Each instruction is one line: `MNEMONIC[ ARG][ #COMMENT]`. Loading is
//! lenient: blank lines are skipped, an unparseable argument is dropped and
//! an unknown mnemonic is kept so the interpreter can fault on it.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// A compiled program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    /// The instructions, addressed by index
    pub instructions: Vec<Instruction>,
}

impl Bytecode {
    /// Creates a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Returns the index the next emitted instruction will get.
    pub fn current_address(&self) -> usize {
        self.instructions.len()
    }

    /// Returns the number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if there are no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Reads a program from its text form.
    pub fn parse(text: &str) -> Self {
        let instructions = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Instruction::parse_line)
            .collect();
        Self { instructions }
    }

    /// Renders the program in its text form, one instruction per line.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Renders the program with instruction addresses, for diagnostics.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (address, instruction) in self.instructions.iter().enumerate() {
            out.push_str(&format!("{:>4}  {}\n", address, instruction));
        }
        out
    }

    /// Writes the text form to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    /// Loads a program from a text file.
    pub fn load_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

impl FromStr for Bytecode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Optional numeric argument
    pub operand: Option<f64>,
    /// Free-text annotation (a variable name on `LEIT`)
    pub comment: Option<String>,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
            comment: None,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: f64) -> Self {
        Self {
            opcode,
            operand: Some(operand),
            comment: None,
        }
    }

    /// Attaches a comment.
    pub fn commented(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Parses one non-blank line of the text form.
    pub fn parse_line(line: &str) -> Self {
        let line = line.trim();
        let (mnemonic, rest) = match line.find(char::is_whitespace) {
            Some(split) => (&line[..split], &line[split..]),
            None => (line, ""),
        };

        let (argument, comment) = match rest.find('#') {
            Some(hash) => {
                let comment = rest[hash + 1..].trim();
                (&rest[..hash], (!comment.is_empty()).then(|| comment.to_string()))
            }
            None => (rest, None),
        };

        let operand = argument
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<f64>().ok());

        Self {
            opcode: OpCode::from_mnemonic(mnemonic),
            operand,
            comment,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        if let Some(operand) = self.operand {
            write!(f, " {}", format_number(operand))?;
        }
        if let Some(comment) = &self.comment {
            write!(f, " #{}", comment)?;
        }
        Ok(())
    }
}

/// Renders a number without a fractional part when it is integral.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        // `as i64` folds -0 into 0 but saturates past 2^63
        if value.abs() < 9.0e15 {
            format!("{}", value as i64)
        } else {
            format!("{:.0}", value)
        }
    } else {
        format!("{}", value)
    }
}

/// Operation codes for the stack machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Program markers
    /// Program start (INPP)
    Start,
    /// Stop execution (PARA)
    Halt,

    // Storage
    /// Push n zero slots (ALME)
    Alloc,
    /// Pop n slots (DESM)
    Dealloc,
    /// Pop and store at an address (ARMZ)
    Store,
    /// Push the value at an address (CRVL)
    Load,
    /// Push a constant (CRCT)
    Const,

    // Arithmetic
    /// Add (SOMA)
    Add,
    /// Subtract (SUBT)
    Sub,
    /// Multiply (MULT)
    Mul,
    /// Divide (DIVI)
    Div,
    /// Arithmetic negation (INVE)
    Neg,

    // Logic
    /// Logical not, `1 - v` (NEGA)
    Not,
    /// Logical and (CONJ)
    And,
    /// Logical or (DISJ)
    Or,

    // Comparison
    /// Equal (CPIG)
    Eq,
    /// Not equal (CDES)
    Ne,
    /// Greater or equal (CMAI)
    Ge,
    /// Less or equal (CPMI)
    Le,
    /// Greater than (CPMA)
    Gt,
    /// Less than (CPME)
    Lt,

    // Control flow
    /// Unconditional jump (DSVI)
    Jump,
    /// Pop and jump if zero (DSVF)
    JumpIfFalse,

    // Console
    /// Read a number (LEIT)
    Read,
    /// Pop and print (IMPR)
    Print,

    // Calls
    /// Push a return address (PUSHER)
    PushReturn,
    /// Push a copy of the value at an address (PARAM)
    PushParam,
    /// Jump to a procedure (CHPR)
    Call,
    /// Return to the saved address (RTPR)
    Return,

    /// A mnemonic the machine does not know; faults when executed
    Unknown(String),
}

impl OpCode {
    /// Returns the mnemonic used in the text form.
    pub fn mnemonic(&self) -> &str {
        match self {
            OpCode::Start => "INPP",
            OpCode::Halt => "PARA",
            OpCode::Alloc => "ALME",
            OpCode::Dealloc => "DESM",
            OpCode::Store => "ARMZ",
            OpCode::Load => "CRVL",
            OpCode::Const => "CRCT",
            OpCode::Add => "SOMA",
            OpCode::Sub => "SUBT",
            OpCode::Mul => "MULT",
            OpCode::Div => "DIVI",
            OpCode::Neg => "INVE",
            OpCode::Not => "NEGA",
            OpCode::And => "CONJ",
            OpCode::Or => "DISJ",
            OpCode::Eq => "CPIG",
            OpCode::Ne => "CDES",
            OpCode::Ge => "CMAI",
            OpCode::Le => "CPMI",
            OpCode::Gt => "CPMA",
            OpCode::Lt => "CPME",
            OpCode::Jump => "DSVI",
            OpCode::JumpIfFalse => "DSVF",
            OpCode::Read => "LEIT",
            OpCode::Print => "IMPR",
            OpCode::PushReturn => "PUSHER",
            OpCode::PushParam => "PARAM",
            OpCode::Call => "CHPR",
            OpCode::Return => "RTPR",
            OpCode::Unknown(mnemonic) => mnemonic,
        }
    }

    /// Maps a mnemonic to its opcode. Unrecognized text becomes `Unknown`.
    pub fn from_mnemonic(mnemonic: &str) -> Self {
        match mnemonic {
            "INPP" => OpCode::Start,
            "PARA" => OpCode::Halt,
            "ALME" => OpCode::Alloc,
            "DESM" => OpCode::Dealloc,
            "ARMZ" => OpCode::Store,
            "CRVL" => OpCode::Load,
            "CRCT" => OpCode::Const,
            "SOMA" => OpCode::Add,
            "SUBT" => OpCode::Sub,
            "MULT" => OpCode::Mul,
            "DIVI" => OpCode::Div,
            "INVE" => OpCode::Neg,
            "NEGA" => OpCode::Not,
            "CONJ" => OpCode::And,
            "DISJ" => OpCode::Or,
            "CPIG" => OpCode::Eq,
            "CDES" => OpCode::Ne,
            "CMAI" => OpCode::Ge,
            "CPMI" => OpCode::Le,
            "CPMA" => OpCode::Gt,
            "CPME" => OpCode::Lt,
            "DSVI" => OpCode::Jump,
            "DSVF" => OpCode::JumpIfFalse,
            "LEIT" => OpCode::Read,
            "IMPR" => OpCode::Print,
            "PUSHER" => OpCode::PushReturn,
            "PARAM" => OpCode::PushParam,
            "CHPR" => OpCode::Call,
            "RTPR" => OpCode::Return,
            other => OpCode::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_returns_index() {
        let mut bytecode = Bytecode::new();
        assert_eq!(bytecode.emit(Instruction::simple(OpCode::Start)), 0);
        assert_eq!(bytecode.emit(Instruction::simple(OpCode::Halt)), 1);
        assert_eq!(bytecode.current_address(), 2);
    }

    #[test]
    fn test_instruction_display() {
        assert_eq!(Instruction::with_operand(OpCode::Const, 5.0).to_string(), "CRCT 5");
        assert_eq!(Instruction::with_operand(OpCode::Const, 2.5).to_string(), "CRCT 2.5");
        assert_eq!(
            Instruction::simple(OpCode::Read).commented("$n").to_string(),
            "LEIT #$n"
        );
        assert_eq!(
            Instruction::with_operand(OpCode::Jump, 0.0)
                .commented("funcao soma")
                .to_string(),
            "DSVI 0 #funcao soma"
        );
    }

    #[test]
    fn test_parse_line() {
        let instr = Instruction::parse_line("  LEIT   #  $x  ");
        assert_eq!(instr.opcode, OpCode::Read);
        assert_eq!(instr.operand, None);
        assert_eq!(instr.comment.as_deref(), Some("$x"));

        let instr = Instruction::parse_line("ARMZ 3");
        assert_eq!(instr.opcode, OpCode::Store);
        assert_eq!(instr.operand, Some(3.0));
        assert_eq!(instr.comment, None);
    }

    #[test]
    fn test_parse_tolerates_bad_argument() {
        let instr = Instruction::parse_line("CRCT abc");
        assert_eq!(instr.opcode, OpCode::Const);
        assert_eq!(instr.operand, None);
    }

    #[test]
    fn test_parse_keeps_unknown_mnemonic() {
        let instr = Instruction::parse_line("FOO 1");
        assert_eq!(instr.opcode, OpCode::Unknown("FOO".into()));
        assert_eq!(instr.to_string(), "FOO 1");
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let bytecode = Bytecode::parse("INPP\n\n   \nALME 1\nPARA\n");
        assert_eq!(bytecode.len(), 3);
    }

    #[test]
    fn test_text_round_trip() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::simple(OpCode::Start));
        bytecode.emit(Instruction::with_operand(OpCode::Alloc, 1.0));
        bytecode.emit(Instruction::simple(OpCode::Read).commented("$x"));
        bytecode.emit(Instruction::with_operand(OpCode::Store, 0.0));
        bytecode.emit(Instruction::with_operand(OpCode::Const, -1.5));
        bytecode.emit(Instruction::simple(OpCode::Halt));

        let reloaded: Bytecode = bytecode.to_text().parse().unwrap();
        assert_eq!(reloaded, bytecode);
    }

    #[test]
    fn test_mnemonics_round_trip() {
        let opcodes = [
            OpCode::Start,
            OpCode::Halt,
            OpCode::Dealloc,
            OpCode::Load,
            OpCode::JumpIfFalse,
            OpCode::PushReturn,
            OpCode::PushParam,
            OpCode::Call,
            OpCode::Return,
        ];
        for opcode in opcodes {
            assert_eq!(OpCode::from_mnemonic(opcode.mnemonic()), opcode);
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(8.0), "8");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(-1e30), format!("{:.0}", -1e30));
    }

    #[test]
    fn test_large_operands_survive_text() {
        let bytecode = Bytecode::parse("CRCT 1e20\nCRCT -12345678901234567890\nARMZ 9007199254740993");
        let reloaded = Bytecode::parse(&bytecode.to_text());
        assert_eq!(reloaded, bytecode);
        assert_eq!(reloaded.instructions[0].operand, Some(1e20));
    }

    #[test]
    fn test_listing() {
        let bytecode = Bytecode::parse("INPP\nPARA");
        assert_eq!(bytecode.listing(), "   0  INPP\n   1  PARA\n");
    }
}
