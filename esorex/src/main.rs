//! EsoRex: the ESO Recipe Execution Tool.
//!
//! `esorex [esorex-options] recipe [recipe-options] sof...`

use std::io::{self, Write};

use anyhow::{anyhow, Result};
use colored::*;
use esorex_core::{help, ConfigResolver, DefaultOpener, MessengerHandle, PluginRunner, Positionals, RunContext, RunSettings};

mod caller;
mod paths;

use caller::Next;

fn main() {
    let messenger = MessengerHandle::new();
    if let Err(e) = messenger.install() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    print!("{}", help::banner());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match run(messenger.clone(), &args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            1
        }
    };
    messenger.flush();
    std::process::exit(code);
}

fn run(messenger: MessengerHandle, args: &[String]) -> Result<i32> {
    let mut ctx = RunContext::new(messenger);
    let mut list = caller::parameters();
    caller::record_defaults(&list, &mut ctx);

    let use_names = paths::use_param_names(std::env::var(paths::USE_PARAM_NAME_ENV).ok().as_deref());
    let resolver = ConfigResolver::new().use_param_names(use_names);

    let sysconfdir = std::env::var(paths::SYSCONFDIR_ENV).ok();
    let global = paths::global_config(sysconfdir.as_deref());
    let local = caller::local_config(args, resolver.env_var("ESOREX_CONFIG"));
    if let Some(path) = local.as_ref().filter(|p| !p.is_file()) {
        let shown = path.display();
        return Err(anyhow!(
            "'--config={}' was specified, but the file '{}' could not be found.",
            shown,
            shown
        ));
    }

    let positionals = resolver.resolve_caller(&mut list, &mut ctx, global.as_deref(), local.as_deref(), args)?;
    let Positionals::Caller { recipe, recipe_args } = positionals else {
        return Err(anyhow!("unexpected positional arguments for the caller"));
    };
    caller::apply_levels(&list, &ctx)?;

    let home = paths::home_dir().ok();
    let mut stdout = io::stdout();
    let code = match caller::handle(&list, &ctx, recipe, recipe_args, home.as_deref(), &mut stdout)? {
        Next::Done => 0,
        Next::Idle => {
            writeln!(stdout, "\n{}", help::version_details().lines().next().unwrap_or_default())?;
            writeln!(stdout)?;
            0
        }
        Next::Recipe { name, args: recipe_args } => {
            let mut command_line = vec![esorex_core::PACKAGE.to_string()];
            command_line.extend_from_slice(args);
            let settings = RunSettings::from_caller(&list).with_command_line(&command_line);
            let opener = DefaultOpener::new();
            let report = PluginRunner::new(&opener, &resolver, &settings).run(&mut ctx, &name, &recipe_args, &mut stdout);
            if let Err(failure) = &report.result {
                log::debug!("recipe {} ended in state {:?}: {}", name, report.state, failure);
            }
            report.exit_code()
        }
    };

    if list.get_bool(&caller::key("mem-check")).unwrap_or(false) {
        log::info!("No memory allocation statistics are available");
    }
    Ok(code)
}
