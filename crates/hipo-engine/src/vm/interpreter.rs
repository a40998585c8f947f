//! The stack machine interpreter.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::{debug, trace};

use crate::compiler::bytecode::{Bytecode, Instruction, OpCode, format_number};

/// Largest number of value stack slots a program may use.
pub const MAX_STACK_SLOTS: usize = 1 << 20;

/// An execution-time fault. Faults end the run.
#[derive(Debug, Error)]
pub enum Fault {
    /// `DIVI` with a zero divisor
    #[error("division by zero at instruction {pc}")]
    DivisionByZero {
        /// Address of the faulting instruction
        pc: usize,
    },
    /// `LEIT` with no input left
    #[error("end of input at instruction {pc}")]
    EndOfInput {
        /// Address of the faulting instruction
        pc: usize,
    },
    /// A mnemonic the machine does not implement
    #[error("unknown instruction '{mnemonic}' at {pc}")]
    UnknownOpcode {
        /// The mnemonic as loaded
        mnemonic: String,
        /// Address of the faulting instruction
        pc: usize,
    },
    /// `ALME` or `ARMZ` would grow the stack past [`MAX_STACK_SLOTS`]
    #[error("stack limit exceeded at instruction {pc}")]
    StackLimit {
        /// Address of the faulting instruction
        pc: usize,
    },
    /// The console could not be read or written
    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Why a run stopped without faulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A `PARA` instruction ran
    Halted,
    /// The program counter ran past the last instruction
    EndOfProgram,
}

/// Summary of a run that finished without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Instructions executed
    pub steps: u64,
    /// How the run ended
    pub reason: HaltReason,
}

/// The outcome of running a program.
pub type RunResult = Result<Completion, Fault>;

/// The hipo stack machine.
///
/// A single value stack holds globals, the active function's parameters
/// and locals, and expression temporaries. A second stack holds return
/// addresses.
#[derive(Debug, Default)]
pub struct VM {
    /// The value stack
    stack: Vec<f64>,
    /// Return addresses pushed by `PUSHER`
    return_stack: Vec<usize>,
    /// Program counter
    pc: usize,
    /// Set by `PARA`
    halted: bool,
}

impl VM {
    /// Creates a new VM.
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(64),
            return_stack: Vec::with_capacity(16),
            pc: 0,
            halted: false,
        }
    }

    /// Returns the value stack as left by the last run.
    pub fn stack(&self) -> &[f64] {
        &self.stack
    }

    /// Returns the return-address stack as left by the last run.
    pub fn return_stack(&self) -> &[usize] {
        &self.return_stack
    }

    /// Returns the program counter.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Runs a program from its first instruction.
    ///
    /// `LEIT` prompts are written to `output` and answered from `input`.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        bytecode: &Bytecode,
        input: &mut R,
        output: &mut W,
    ) -> RunResult {
        self.pc = 0;
        self.halted = false;
        self.stack.clear();
        self.return_stack.clear();

        debug!(instructions = bytecode.len(), "execution started");
        let mut steps = 0u64;

        loop {
            if self.halted {
                debug!(steps, "execution halted");
                return Ok(Completion {
                    steps,
                    reason: HaltReason::Halted,
                });
            }

            let Some(instruction) = bytecode.instructions.get(self.pc) else {
                debug!(steps, pc = self.pc, "execution ran off the end");
                return Ok(Completion {
                    steps,
                    reason: HaltReason::EndOfProgram,
                });
            };

            trace!(pc = self.pc, %instruction, stack = ?self.stack, "step");
            self.step(instruction, input, output)?;
            steps += 1;
        }
    }

    fn step<R: BufRead, W: Write>(
        &mut self,
        instruction: &Instruction,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), Fault> {
        let operand = instruction.operand;

        match &instruction.opcode {
            OpCode::Start => {}
            OpCode::Halt => {
                self.halted = true;
                return Ok(());
            }

            // Storage
            OpCode::Alloc => {
                let len = self
                    .stack
                    .len()
                    .checked_add(count(operand))
                    .filter(|len| *len <= MAX_STACK_SLOTS)
                    .ok_or(Fault::StackLimit { pc: self.pc })?;
                self.stack.resize(len, 0.0);
            }
            OpCode::Dealloc => {
                let count = count(operand).min(self.stack.len());
                self.stack.truncate(self.stack.len() - count);
            }
            OpCode::Store => {
                let address = address(operand);
                if address >= MAX_STACK_SLOTS {
                    return Err(Fault::StackLimit { pc: self.pc });
                }
                let value = self.pop();
                if address >= self.stack.len() {
                    self.stack.resize(address + 1, 0.0);
                }
                self.stack[address] = value;
            }
            OpCode::Load => {
                let value = self.load(address(operand));
                self.stack.push(value);
            }
            OpCode::Const => self.stack.push(operand.unwrap_or(0.0)),

            // Arithmetic
            OpCode::Add => self.binary_num_op(|a, b| a + b),
            OpCode::Sub => self.binary_num_op(|a, b| a - b),
            OpCode::Mul => self.binary_num_op(|a, b| a * b),
            OpCode::Div => {
                let b = self.pop();
                let a = self.pop();
                if b == 0.0 {
                    return Err(Fault::DivisionByZero { pc: self.pc });
                }
                self.stack.push(a / b);
            }
            OpCode::Neg => {
                let value = self.pop();
                self.stack.push(-value);
            }

            // Logic
            OpCode::Not => {
                let value = self.pop();
                self.stack.push(1.0 - value);
            }
            OpCode::And => self.logic_op(|a, b| a && b),
            OpCode::Or => self.logic_op(|a, b| a || b),

            // Comparison
            OpCode::Eq => self.compare_op(|a, b| a == b),
            OpCode::Ne => self.compare_op(|a, b| a != b),
            OpCode::Ge => self.compare_op(|a, b| a >= b),
            OpCode::Le => self.compare_op(|a, b| a <= b),
            OpCode::Gt => self.compare_op(|a, b| a > b),
            OpCode::Lt => self.compare_op(|a, b| a < b),

            // Control flow
            OpCode::Jump | OpCode::Call => {
                self.pc = address(operand);
                return Ok(());
            }
            OpCode::JumpIfFalse => {
                if self.pop() == 0.0 {
                    self.pc = address(operand);
                    return Ok(());
                }
            }

            // Console
            OpCode::Read => {
                let value = self.read_number(instruction.comment.as_deref(), input, output)?;
                self.stack.push(value);
            }
            OpCode::Print => {
                let value = self.pop();
                writeln!(output, "[Saida] {}", format_number(value))?;
            }

            // Calls
            OpCode::PushReturn => self.return_stack.push(address(operand)),
            OpCode::PushParam => {
                let value = self.load(address(operand));
                self.stack.push(value);
            }
            OpCode::Return => match self.return_stack.pop() {
                Some(target) => {
                    self.pc = target;
                    return Ok(());
                }
                None => debug!(pc = self.pc, "return with empty return stack"),
            },

            OpCode::Unknown(mnemonic) => {
                return Err(Fault::UnknownOpcode {
                    mnemonic: mnemonic.clone(),
                    pc: self.pc,
                });
            }
        }

        self.pc += 1;
        Ok(())
    }

    fn read_number<R: BufRead, W: Write>(
        &self,
        hint: Option<&str>,
        input: &mut R,
        output: &mut W,
    ) -> Result<f64, Fault> {
        match hint {
            Some(name) if !name.trim().is_empty() => write!(output, "[Entrada {}] ", name)?,
            _ => write!(output, "[Entrada] ")?,
        }
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(Fault::EndOfInput { pc: self.pc });
        }
        Ok(line.trim().parse().unwrap_or(0.0))
    }

    /// Pops a value; an empty stack yields 0.
    fn pop(&mut self) -> f64 {
        self.stack.pop().unwrap_or(0.0)
    }

    fn load(&self, address: usize) -> f64 {
        self.stack.get(address).copied().unwrap_or(0.0)
    }

    fn binary_num_op<F>(&mut self, op: F)
    where
        F: Fn(f64, f64) -> f64,
    {
        let b = self.pop();
        let a = self.pop();
        self.stack.push(op(a, b));
    }

    fn compare_op<F>(&mut self, op: F)
    where
        F: Fn(f64, f64) -> bool,
    {
        let b = self.pop();
        let a = self.pop();
        self.stack.push(if op(a, b) { 1.0 } else { 0.0 });
    }

    /// Only an exact 1.0 counts as true.
    fn logic_op<F>(&mut self, op: F)
    where
        F: Fn(bool, bool) -> bool,
    {
        self.compare_op(|a, b| op(a == 1.0, b == 1.0));
    }
}

/// Decodes an address operand. A negative `n` stands for `-n - 1`.
///
/// Out-of-range operands saturate instead of wrapping.
pub fn address(operand: Option<f64>) -> usize {
    let encoded = operand.unwrap_or(0.0) as i64;
    if encoded < 0 {
        usize::try_from(-(encoded + 1)).unwrap_or(usize::MAX)
    } else {
        usize::try_from(encoded).unwrap_or(usize::MAX)
    }
}

fn count(operand: Option<f64>) -> usize {
    operand.map(|n| n as usize).unwrap_or(0)
}
