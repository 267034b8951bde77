/*! # Shelob

🕷️ Shelob builds corpora out of line-oriented JSON document dumps by running
configurable map/filter pipelines over them.

A pipeline is declared in a JSON configuration file: a source reading
documents, any number of transforms scoring, rewriting or dropping them, and
a collector writing the survivors out or aggregating them. The runner fans
the configured pipeline out over every file of the input directories, with
one pipeline instance per worker.

This project can be used as a command line tool or as a lib, composing and
running pipelines with [pipeline::build_pipeline] and registering custom
stages with [config::Registry].
!*/
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod runner;
pub mod stages;
