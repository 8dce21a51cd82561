// Weft - weftd
// Module: line-oriented command interpreter
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The driver's command interpreter.
//!
//! Commands are one per line. A leading `:module <name>` prefix
//! addresses a named module; bare commands address the most recently
//! loaded one.
//!
//! ```text
//! :version
//! :init
//! :load [name] file.wasm
//! :load-hex n
//! :invoke "fn arg..."
//! :register name
//! :save file.wasm
//! :global-get name
//! :module <name> <subcmd> ...
//! ```

use std::fs;
use std::io::{BufRead, Write};
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use weft_decoder::{decode_module, DecodeConfig};
use weft_format::{encode_module, Module};
use weft_host::base_namespace;
use weft_runtime::{invoke_func, EngineConfig, Instance, InvokeError, Provider, Trap};

/// What a command asks the driver loop to do afterwards.
pub enum Status {
    /// Keep reading commands.
    Ready,
    /// The guest asked to exit with this code.
    Exit(u32),
}

struct ReplModule {
    name: Option<String>,
    module: Rc<Module>,
    instance: Instance,
}

/// Interpreter state: the loaded modules plus the import chain new
/// instantiations resolve against, newest registration first.
pub struct Repl {
    decode: DecodeConfig,
    engine: EngineConfig,
    trap_ok: bool,
    modules: Vec<ReplModule>,
    providers: Vec<Rc<Provider>>,
}

impl Repl {
    pub fn new(decode: DecodeConfig, engine: EngineConfig, trap_ok: bool) -> Self {
        Self {
            decode,
            engine,
            trap_ok,
            modules: Vec::new(),
            providers: vec![base_namespace()],
        }
    }

    /// Runs the read-line loop until EOF or a guest exit.
    pub fn run(&mut self, input: &mut dyn BufRead) -> Result<Status> {
        let mut line = String::new();
        loop {
            print!("weft> ");
            std::io::stdout().flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(Status::Ready);
            }
            match self.run_line(&line) {
                Ok(Status::Ready) => {}
                Ok(Status::Exit(code)) => return Ok(Status::Exit(code)),
                Err(e) => println!("Error: {e:#}"),
            }
        }
    }

    /// Executes one command line.
    pub fn run_line(&mut self, line: &str) -> Result<Status> {
        debug!("repl cmd {:?}", line.trim_end());
        let line = line.trim();
        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        match cmd {
            "" => Ok(Status::Ready),
            ":version" => {
                print_version();
                Ok(Status::Ready)
            }
            ":init" => {
                self.reset();
                Ok(Status::Ready)
            }
            ":module" => {
                let (modname, rest) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: :module <name> <subcmd> ..."))?;
                let (subcmd, opt) = match rest.trim().split_once(char::is_whitespace) {
                    Some((subcmd, opt)) => (subcmd, opt.trim()),
                    None => (rest.trim(), ""),
                };
                self.subcmd(subcmd, Some(modname), opt)
            }
            _ if cmd.starts_with(':') => self.subcmd(&cmd[1..], None, rest),
            _ => bail!("unknown command {cmd:?}"),
        }
    }

    fn subcmd(&mut self, subcmd: &str, modname: Option<&str>, opt: &str) -> Result<Status> {
        match subcmd {
            "load" => {
                // ":load file" or ":load name file".
                let (name, path) = match opt.split_once(char::is_whitespace) {
                    Some((name, path)) => (Some(name.to_string()), path.trim()),
                    None if !opt.is_empty() => (modname.map(str::to_string), opt),
                    None => bail!("usage: :load [name] <file>"),
                };
                let name = name.or_else(|| modname.map(str::to_string));
                let bytes = fs::read(path).with_context(|| format!("failed to read {path}"))?;
                self.load_bytes(name, &bytes)?;
                Ok(Status::Ready)
            }
            "load-hex" => {
                let count: usize = opt.parse().context("usage: :load-hex <byte count>")?;
                let bytes = read_hex_from_stdin(count)?;
                self.load_bytes(modname.map(str::to_string), &bytes)?;
                Ok(Status::Ready)
            }
            "invoke" if !opt.is_empty() => self.invoke(modname, opt),
            "register" if !opt.is_empty() => {
                self.register(modname, opt)?;
                Ok(Status::Ready)
            }
            "save" if !opt.is_empty() => {
                self.save(modname, opt)?;
                Ok(Status::Ready)
            }
            "global-get" if !opt.is_empty() => {
                self.global_get(modname, opt)?;
                Ok(Status::Ready)
            }
            _ => bail!("unknown command {subcmd:?}"),
        }
    }

    fn reset(&mut self) {
        self.modules.clear();
        self.providers = vec![base_namespace()];
    }

    /// Decodes, instantiates, and starts a module, then adds it to the
    /// state. A trapping start function is fatal to the load unless the
    /// driver was told to tolerate it.
    pub fn load_bytes(&mut self, name: Option<String>, bytes: &[u8]) -> Result<()> {
        let module = Rc::new(
            decode_module(bytes, &self.decode).map_err(|e| anyhow!("failed to load: {e}"))?,
        );
        let instance = Instance::instantiate_no_init(&module, &self.providers)
            .map_err(|e| anyhow!("failed to instantiate: {e}"))?;
        if let Err(trap) = instance.run_start(&self.engine) {
            print_trap(&trap);
            if !self.trap_ok {
                bail!("start function trapped");
            }
        }
        debug!(
            "loaded module {:?} ({} bytes)",
            name.as_deref().unwrap_or("<anonymous>"),
            bytes.len()
        );
        self.modules.push(ReplModule {
            name,
            module,
            instance,
        });
        Ok(())
    }

    fn find(&self, modname: Option<&str>) -> Result<&ReplModule> {
        match modname {
            Some(name) => self
                .modules
                .iter()
                .find(|m| m.name.as_deref() == Some(name))
                .ok_or_else(|| anyhow!("no module named {name:?}")),
            None => self.modules.last().ok_or_else(|| anyhow!("no module loaded")),
        }
    }

    /// `:invoke "fn arg..."`: arguments are matched positionally
    /// against the function's true signature.
    pub fn invoke(&self, modname: Option<&str>, cmd: &str) -> Result<Status> {
        let mut words = cmd.split_whitespace();
        let funcname = unescape(words.next().ok_or_else(|| anyhow!("no function name"))?)?;
        let module = self.find(modname)?;
        let func = module
            .instance
            .export_func(&funcname)
            .map_err(|e| anyhow!("{e}"))?;
        let ty = func.ty().clone();
        let mut args = Vec::with_capacity(ty.params.len());
        for param in &ty.params {
            let word = words.next().ok_or_else(|| anyhow!("missing argument"))?;
            args.push(
                weft_foundation::Value::parse(*param, word).map_err(|e| anyhow!("{e}"))?,
            );
        }
        if words.next().is_some() {
            bail!("extra argument");
        }
        match invoke_func(&func, &args, &self.engine) {
            Ok(results) => {
                print_results(&results);
                Ok(Status::Ready)
            }
            Err(InvokeError::Trap(trap)) => {
                if let Some(code) = trap.exit_code() {
                    debug!("voluntary exit ({code})");
                    return Ok(Status::Exit(code));
                }
                print_trap(&trap);
                Ok(Status::Ready)
            }
            Err(InvokeError::Contract(e)) => Err(anyhow!("{e}")),
        }
    }

    /// `:register name`: future loads resolve imports from this
    /// instance's exports first.
    fn register(&mut self, modname: Option<&str>, register_name: &str) -> Result<()> {
        let name = unescape(register_name)?;
        let provider = self.find(modname)?.instance.export_provider(name);
        self.providers.insert(0, Rc::new(provider));
        Ok(())
    }

    /// `:save file`: re-encodes the module descriptor and verifies the
    /// output round-trips before writing it.
    fn save(&self, modname: Option<&str>, path: &str) -> Result<()> {
        let module = self.find(modname)?;
        let bytes = encode_module(&module.module).map_err(|e| anyhow!("{e}"))?;
        decode_module(&bytes, &self.decode)
            .map_err(|e| anyhow!("re-encoded module does not round-trip: {e}"))?;
        fs::write(path, &bytes).with_context(|| format!("failed to write {path}"))?;
        Ok(())
    }

    fn global_get(&self, modname: Option<&str>, name: &str) -> Result<()> {
        let name = unescape(name)?;
        let value = self
            .find(modname)?
            .instance
            .export_global_value(&name)
            .map_err(|e| anyhow!("{e}"))?;
        print_results(&[value]);
        Ok(())
    }
}

fn print_version() {
    println!("weft wasm interpreter {}", env!("CARGO_PKG_VERSION"));
    println!("sizeof(usize) = {}", std::mem::size_of::<usize>());
}

/// Matches assert_trap expectations in wast test suites.
fn print_trap(trap: &Trap) {
    let detail = trap.detail.as_deref().unwrap_or("no message");
    println!(
        "Error: [trap] {} ({}): {}",
        trap.kind.message(),
        trap.kind.id(),
        detail
    );
}

fn print_results(results: &[weft_foundation::Value]) {
    if results.is_empty() {
        println!("Result: <Empty Stack>");
        return;
    }
    let rendered: Vec<String> = results.iter().map(ToString::to_string).collect();
    println!("Result: {}", rendered.join(", "));
}

/// Unescapes `\xNN` sequences and strips unescaped double quotes, so
/// non-ASCII export names can be spelled on the command line.
fn unescape(s: &str) -> Result<String> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.bytes();
    let mut in_quote = false;
    while let Some(b) = chars.next() {
        match b {
            b'"' => in_quote = !in_quote,
            b'\\' => {
                if chars.next() != Some(b'x') {
                    bail!("bad escape in {s:?}");
                }
                let hi = chars.next().ok_or_else(|| anyhow!("bad escape in {s:?}"))?;
                let lo = chars.next().ok_or_else(|| anyhow!("bad escape in {s:?}"))?;
                let mut byte = [0u8; 1];
                hex::decode_to_slice([hi, lo], &mut byte)
                    .map_err(|_| anyhow!("bad escape in {s:?}"))?;
                out.push(byte[0]);
            }
            _ => out.push(b),
        }
    }
    if in_quote {
        bail!("unterminated quote in {s:?}");
    }
    String::from_utf8(out).context("unescaped name is not valid UTF-8")
}

/// `:load-hex` payload: hex digits from stdin, whitespace ignored.
fn read_hex_from_stdin(count: usize) -> Result<Vec<u8>> {
    let mut digits = String::with_capacity(count * 2);
    let stdin = std::io::stdin();
    let mut line = String::new();
    while digits.len() < count * 2 {
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("unexpected EOF while reading {count} hex bytes");
        }
        digits.extend(line.chars().filter(|c| !c.is_whitespace()));
    }
    if digits.len() > count * 2 {
        bail!("more hex digits than announced");
    }
    hex::decode(&digits).map_err(|e| anyhow!("bad hex input: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::Value;

    fn test_repl() -> Repl {
        Repl::new(DecodeConfig::default(), EngineConfig::default(), false)
    }

    fn wasm(source: &str) -> Vec<u8> {
        wat::parse_str(source).unwrap()
    }

    #[test]
    fn unescape_handles_hex_and_quotes() {
        assert_eq!(unescape("add").unwrap(), "add");
        assert_eq!(unescape("\"two words\"").unwrap(), "two words");
        assert_eq!(unescape("\\xe1\\xba\\x9b").unwrap(), "\u{1e9b}");
        assert!(unescape("\\q").is_err());
    }

    #[test]
    fn result_formatting_matches_driver_convention() {
        assert_eq!(Value::I32(-1).to_string(), "4294967295:i32");
        assert_eq!(Value::FuncRef(None).to_string(), "null:funcref");
    }

    #[test]
    fn load_then_invoke() {
        let mut repl = test_repl();
        let bytes = wasm(
            r#"(module (func (export "add") (param i32 i32) (result i32)
                 local.get 0 local.get 1 i32.add))"#,
        );
        repl.load_bytes(None, &bytes).unwrap();
        assert!(matches!(
            repl.invoke(None, "add 1 2").unwrap(),
            Status::Ready
        ));
    }

    #[test]
    fn register_makes_exports_importable() {
        let mut repl = test_repl();
        repl.load_bytes(
            Some("lib".to_string()),
            &wasm(r#"(module (func (export "three") (result i32) i32.const 3))"#),
        )
        .unwrap();
        repl.run_line(":module lib register mylib").unwrap();
        repl.load_bytes(
            None,
            &wasm(
                r#"(module
                     (import "mylib" "three" (func $three (result i32)))
                     (func (export "six") (result i32)
                       call $three call $three i32.add))"#,
            ),
        )
        .unwrap();
        assert!(matches!(
            repl.invoke(None, "six").unwrap(),
            Status::Ready
        ));
    }

    #[test]
    fn voluntary_exit_reports_the_code() {
        let mut repl = test_repl();
        repl.load_bytes(
            None,
            &wasm(
                r#"(module
                     (import "weft" "exit" (func $exit (param i32)))
                     (func (export "quit") i32.const 7 call $exit))"#,
            ),
        )
        .unwrap();
        match repl.invoke(None, "quit").unwrap() {
            Status::Exit(code) => assert_eq!(code, 7),
            Status::Ready => panic!("expected exit"),
        }
    }

    #[test]
    fn unnamed_commands_address_the_newest_module() {
        let mut repl = test_repl();
        repl.load_bytes(
            Some("a".to_string()),
            &wasm(r#"(module (global (export "g") i32 (i32.const 1)))"#),
        )
        .unwrap();
        repl.load_bytes(
            Some("b".to_string()),
            &wasm(r#"(module (global (export "g") i32 (i32.const 2)))"#),
        )
        .unwrap();
        let newest = repl.find(None).unwrap();
        assert_eq!(newest.name.as_deref(), Some("b"));
        let value = newest.instance.export_global_value("g").unwrap();
        assert_eq!(value, Value::I32(2));
    }
}
