//! The interactive monitor.
//!
//! Line-oriented commands dispatched over the machine. Dispatch is a pure
//! function so tests can drive it without a terminal; the rustyline REPL
//! wrapper only adds prompting and history.

use emu_core::Bus;
use intel_386::flags::{AF, CF, DF, IF, NT, OF, PF, SF, TF, ZF};
use intel_386::registers::REGS32;

use crate::expr;
use crate::machine::Machine;

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdResult {
    Continue,
    Quit,
}

/// Command table for `help`.
const COMMANDS: &[(&str, &str)] = &[
    ("help", "Display information about all supported commands"),
    ("c", "Continue execution until a watchpoint hit or halt"),
    ("q", "Exit the monitor"),
    ("si", "si [N]: step N instructions (default 1)"),
    ("info", "info r: print registers; info w: list watchpoints"),
    ("x", "x N EXPR: dump N words starting at address EXPR"),
    ("p", "p EXPR: evaluate and print an expression"),
    ("w", "w EXPR: set a watchpoint on an expression"),
    ("d", "d N: delete watchpoint N"),
];

/// The monitor owns the machine and interprets commands against it.
pub struct Monitor {
    machine: Machine,
}

impl Monitor {
    #[must_use]
    pub fn new(machine: Machine) -> Self {
        Self { machine }
    }

    /// Interactive loop: read, dispatch, repeat until `q` or EOF.
    pub fn run(&mut self) -> rustyline::Result<()> {
        let mut rl = rustyline::DefaultEditor::new()?;
        loop {
            match rl.readline("(emu-x86) ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(&line);
                    }
                    if self.dispatch(&line) == CmdResult::Quit {
                        return Ok(());
                    }
                }
                Err(rustyline::error::ReadlineError::Interrupted
                | rustyline::error::ReadlineError::Eof) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Execute one command line.
    pub fn dispatch(&mut self, line: &str) -> CmdResult {
        let line = line.trim();
        let (cmd, args) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => {}
            "help" => cmd_help(args),
            "c" => self.machine.cpu_exec(u64::MAX),
            "q" => return CmdResult::Quit,
            "si" => self.cmd_si(args),
            "info" => self.cmd_info(args),
            "x" => self.cmd_x(args),
            "p" => self.cmd_p(args),
            "w" => self.cmd_w(args),
            "d" => self.cmd_d(args),
            _ => println!("Unknown command '{cmd}'"),
        }
        CmdResult::Continue
    }

    fn cmd_si(&mut self, args: &str) {
        let steps = if args.is_empty() {
            Some(1)
        } else {
            args.parse::<u64>().ok().filter(|&n| n > 0)
        };
        match steps {
            Some(n) => self.machine.cpu_exec(n),
            None => println!("Invalid number of steps: {args}"),
        }
    }

    fn cmd_info(&mut self, args: &str) {
        match args {
            "r" => self.print_registers(),
            "w" => self.print_watchpoints(),
            "" => println!("Usage: info r | info w"),
            _ => println!("Unknown argument '{args}'"),
        }
    }

    fn print_registers(&self) {
        let regs = &self.machine.cpu.regs;
        for (i, name) in REGS32.iter().enumerate() {
            let v = regs.reg32(i as u8);
            println!("{name}: {v:#010x} ({v})");
        }
        println!("eip: {0:#010x} ({0})", regs.eip);
        println!("eflags: {0:#010x} ({0})", regs.eflags.0);
        for (name, mask) in [
            ("CF", CF),
            ("PF", PF),
            ("AF", AF),
            ("ZF", ZF),
            ("SF", SF),
            ("TF", TF),
            ("IF", IF),
            ("DF", DF),
            ("OF", OF),
            ("NT", NT),
        ] {
            println!("{name}: {}", u8::from(regs.eflags.is_set(mask)));
        }
        println!("IOPL: {}", regs.eflags.iopl());
    }

    fn print_watchpoints(&self) {
        if self.machine.watchpoints.is_empty() {
            println!("No watchpoints.");
            return;
        }
        println!("{:<8}{}", "Num", "What");
        for (no, expr_text) in self.machine.watchpoints.iter() {
            println!("{no:<8}{expr_text}");
        }
    }

    fn cmd_x(&mut self, args: &str) {
        let Some((count, expr_text)) = args.split_once(char::is_whitespace) else {
            println!("Usage: x N EXPR");
            return;
        };
        let Ok(n) = count.parse::<u32>() else {
            println!("Invalid word count: {count}");
            return;
        };
        if n == 0 {
            println!("Invalid word count: {count}");
            return;
        }
        let addr = match expr::eval(expr_text, &self.machine.cpu) {
            Ok(addr) => addr,
            Err(err) => {
                println!("Invalid expression: {err}");
                return;
            }
        };
        for i in 0..n {
            let at = addr.wrapping_add(i * 4);
            let word = self.machine.mem.read(at, 4);
            println!("{at:#010x}: {word:#010x}");
        }
    }

    fn cmd_p(&mut self, args: &str) {
        if args.is_empty() {
            println!("Usage: p EXPR");
            return;
        }
        match expr::eval(args, &self.machine.cpu) {
            Ok(value) => println!("{value}"),
            Err(err) => println!("Invalid expression: {err}"),
        }
    }

    fn cmd_w(&mut self, args: &str) {
        if args.is_empty() {
            println!("Usage: w EXPR");
            return;
        }
        // Reject unparsable expressions before allocating.
        let value = match expr::eval(args, &self.machine.cpu) {
            Ok(value) => value,
            Err(err) => {
                println!("Invalid expression: {err}");
                return;
            }
        };
        match self.machine.watchpoints.add(args.to_string(), value) {
            Some(no) => println!("Watchpoint {no}: {args}"),
            None => println!("No free watchpoint available"),
        }
    }

    fn cmd_d(&mut self, args: &str) {
        let Ok(no) = args.parse::<usize>() else {
            println!("Usage: d N");
            return;
        };
        if self.machine.watchpoints.remove(no) {
            println!("Deleted watchpoint {no}");
        } else {
            println!("No watchpoint number {no}.");
        }
    }

    /// The machine, for tests and for batch mode.
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}

fn cmd_help(args: &str) {
    if args.is_empty() {
        for (name, description) in COMMANDS {
            println!("{name} - {description}");
        }
        return;
    }
    match COMMANDS.iter().find(|(name, _)| *name == args) {
        Some((name, description)) => println!("{name} - {description}"),
        None => println!("Unknown command '{args}'"),
    }
}
