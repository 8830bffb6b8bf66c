//! A sample BUTTRESS build.
//!
//! Two targets write greeting files; a third concatenates them. Run with
//! no arguments to build the default target, `--tree` to inspect the
//! graph, `-c`/`-x` to clean or purge.

use std::process::ExitCode;

use buttress_cli::bake;
use buttress_core::Artifact;
use buttress_graph::{Blueprint, BuildEngine, Registry};

fn main() -> ExitCode {
    bake(|ctx| {
        let sh = ctx.shell();
        let mut registry = Registry::new();

        let hello_sh = sh.clone();
        registry.target("hello", &[], move |_| {
            Ok(Blueprint::work(
                hello_sh
                    .cmd("echo 'Hello' >> {output}")
                    .output(Artifact::file("hello.txt"))
                    .build()?,
            ))
        });

        let world_sh = sh.clone();
        registry.target("world", &[], move |_| {
            Ok(Blueprint::work(
                world_sh
                    .cmd("echo 'World' >> {output}")
                    .output(Artifact::file("world.txt"))
                    .build()?,
            ))
        });

        let top_sh = sh.clone();
        registry.target("hello_world", &["hello", "world"], move |_| {
            Ok(Blueprint::work(
                top_sh
                    .cmd("cat {input} >> {output}")
                    .output(Artifact::file("helloworld.txt"))
                    .build()?,
            ))
        });

        registry.set_default("hello_world");
        Ok(BuildEngine::new(registry))
    })
}
