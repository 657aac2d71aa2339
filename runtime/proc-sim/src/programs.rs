//! Built-in programs
//!
//! | name               | args                    | behavior                               |
//! |--------------------|-------------------------|----------------------------------------|
//! | `prog_echo`        | words...                | print the words, exit 0                |
//! | `prog_count`       | `[n=5] [interval=1.0]`  | print `count i/n` every interval       |
//! | `prog_sleep_exit`  | `[secs=2] [code=0]`     | sleep, then exit with `code`           |
//! | `prog_parent_demo` |                         | fork; child execs `prog_echo`, parent waits |
//! | `prog_exec`        | `program [args...]`     | exec into `program`                    |
//! | `prog_fail`        |                         | fail with a fault (exit 1)             |
//! | `prog_panic`       |                         | panic (exit 1)                         |

use crate::env::{ProcEnv, ProcResult, Signal};
use crate::registry::{ProgramRegistry, RegistryBuilder};
use crate::{ProcError, Result};
use std::time::Duration;

/// Register every built-in program on `builder`
pub fn install(builder: RegistryBuilder) -> Result<RegistryBuilder> {
    builder
        .register("prog_echo", prog_echo)?
        .register("prog_count", prog_count)?
        .register("prog_sleep_exit", prog_sleep_exit)?
        .register("prog_parent_demo", prog_parent_demo)?
        .register("prog_exec", prog_exec)?
        .register("prog_fail", prog_fail)?
        .register("prog_panic", prog_panic)
}

/// Registry holding only the built-in programs
pub fn builtin_registry() -> Result<ProgramRegistry> {
    Ok(install(ProgramRegistry::builder())?.build())
}

fn secs(value: f64, program: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| ProcError::InvalidArgument {
        program: program.to_string(),
        reason: format!("`{value}` is not a valid duration"),
    })
}

pub fn prog_echo(env: &mut ProcEnv) -> ProcResult {
    let args = env.args();
    if args.is_empty() {
        env.print(format!("[pid {}] echo:", env.getpid()));
    } else {
        env.print(format!("[pid {}] echo: {}", env.getpid(), args.join(" ")));
    }
    Err(env.exit(0))
}

pub fn prog_count(env: &mut ProcEnv) -> ProcResult {
    let n: u32 = env.arg_or(0, 5)?;
    let interval = secs(env.arg_or(1, 1.0)?, "prog_count")?;

    for i in 1..=n {
        env.print(format!("[pid {}] count {i}/{n}", env.getpid()));
        env.sleep(interval);
    }
    Err(env.exit(0))
}

pub fn prog_sleep_exit(env: &mut ProcEnv) -> ProcResult {
    let seconds: f64 = env.arg_or(0, 2.0)?;
    let code: i32 = env.arg_or(1, 0)?;

    env.sleep(secs(seconds, "prog_sleep_exit")?);
    env.print(format!("[pid {}] slept {seconds}s, exiting {code}", env.getpid()));
    Err(env.exit(code))
}

/// Fork a child; the child execs `prog_echo child-did-exec` and the parent
/// waits for it
pub fn prog_parent_demo(env: &mut ProcEnv) -> ProcResult {
    let pid = env.getpid();

    if env.fork_return_value() == Some(0) {
        env.print(format!("[child {pid}] child branch (fork returned 0)"));
        return Err(env.exec("prog_echo", ["child-did-exec"]));
    }

    env.print(format!("[parent {pid}] starting demo"));
    let child = env.fork()?;
    env.print(format!("[parent {pid}] forked child {child}; waiting..."));
    let code = env.wait(child)?;
    env.print(format!("[parent {pid}] child {child} exited with code {code}"));
    Err(env.exit(0))
}

pub fn prog_exec(env: &mut ProcEnv) -> ProcResult {
    let mut args = env.args().into_iter();
    let Some(program) = args.next() else {
        return Err(Signal::Fault(ProcError::InvalidArgument {
            program: "prog_exec".into(),
            reason: "usage: prog_exec <program> [args...]".into(),
        }));
    };
    Err(env.exec(&program, args))
}

pub fn prog_fail(env: &mut ProcEnv) -> ProcResult {
    env.print(format!("[pid {}] failing on purpose", env.getpid()));
    Err(ProcError::Crashed("prog_fail always fails".into()).into())
}

pub fn prog_panic(env: &mut ProcEnv) -> ProcResult {
    panic!("prog_panic in pid {}", env.getpid());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let registry = builtin_registry().unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "prog_count",
                "prog_echo",
                "prog_exec",
                "prog_fail",
                "prog_panic",
                "prog_parent_demo",
                "prog_sleep_exit",
            ]
        );
    }

    #[test]
    fn test_install_rejects_collision() {
        let builder = ProgramRegistry::builder().register("prog_echo", |_| Ok(())).unwrap();
        assert!(matches!(install(builder), Err(ProcError::DuplicateProgram { .. })));
    }

    #[test]
    fn test_secs_rejects_negative() {
        assert!(secs(-1.0, "p").is_err());
        assert_eq!(secs(0.25, "p").unwrap(), Duration::from_millis(250));
    }
}
