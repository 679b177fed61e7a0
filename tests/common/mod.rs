//! Shared test helpers for classmerge integration tests.
//!
//! Every test works in its own temp directory laid out like a small site:
//! `ext/<provider>/Classes/<class key>.php` for sources, `cache/` for merged
//! units and `classmerge.toml` at the root.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Identifier prefix used by [`Project::config_for`].
pub const PREFIX: &str = "tx_news_";

/// A throwaway project directory.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path where `provider` keeps the source of `class_key`.
    pub fn class_path(&self, provider: &str, class_key: &str) -> PathBuf {
        self.root()
            .join("ext")
            .join(provider)
            .join("Classes")
            .join(format!("{class_key}.php"))
    }

    /// Write `provider`'s source for `class_key`.
    pub fn write_class(&self, provider: &str, class_key: &str, text: &str) -> PathBuf {
        let path = self.class_path(provider, class_key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Write `classmerge.toml` and return its path.
    pub fn write_config(&self, toml: &str) -> PathBuf {
        let path = self.root().join("classmerge.toml");
        std::fs::write(&path, toml).unwrap();
        path
    }

    /// A config with base provider `news`, a root for every provider in
    /// `providers`, and the given `(class key, override providers)` entries.
    pub fn config_for(&self, providers: &[&str], classes: &[(&str, &[&str])]) -> PathBuf {
        let mut toml = String::from(
            "[project]\nroot = \".\"\nbase_provider = \"news\"\n\n[providers]\nnews = \"ext/news\"\n",
        );
        for p in providers {
            toml.push_str(&format!("{p} = \"ext/{p}\"\n"));
        }
        toml.push_str(&format!(
            "\n[cache]\ndir = \"cache\"\nidentifier_prefix = \"{PREFIX}\"\n"
        ));
        for (key, overrides) in classes {
            let list: Vec<String> = overrides.iter().map(|p| format!("\"{p}\"")).collect();
            toml.push_str(&format!(
                "\n[[class]]\nkey = \"{key}\"\nproviders = [{}]\n",
                list.join(", ")
            ));
        }
        self.write_config(&toml)
    }

    /// Path of the cache file for `identifier`.
    pub fn cache_file(&self, identifier: &str) -> PathBuf {
        self.root().join("cache").join(format!("{identifier}.php"))
    }

    /// Contents of the cache file for `identifier`, if any.
    pub fn read_cache(&self, identifier: &str) -> Option<String> {
        std::fs::read_to_string(self.cache_file(identifier)).ok()
    }
}

/// A base class with one property and a constructor assigning it.
pub fn base_class(name: &str) -> String {
    format!(
        "<?php
namespace Vendor\\News\\Domain\\Model;

class {name}
{{
    protected $title;

    public function __construct()
    {{
        $this->title = 'base';
    }}
}}
"
    )
}

/// An override class adding `$<property>` and, optionally, a constructor
/// assigning it.
pub fn override_class(name: &str, property: &str, with_constructor: bool) -> String {
    let mut text = format!("<?php\nclass {name}\n{{\n    protected ${property};\n");
    if with_constructor {
        text.push_str(&format!(
            "\n    public function __construct()\n    {{\n        $this->{property} = '{property}';\n    }}\n"
        ));
    }
    text.push_str("}\n");
    text
}

/// Run classmerge in a directory with tracing disabled.
pub fn classmerge_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_classmerge"))
        .args(args)
        .current_dir(dir)
        .env_remove("CLASSMERGE_TRACE")
        .env_remove("CLASSMERGE_CONFIG")
        .output()
        .expect("failed to execute classmerge")
}

/// Run classmerge and assert it succeeds. Returns stdout as string.
pub fn classmerge_ok(dir: &Path, args: &[&str]) -> String {
    let out = classmerge_in(dir, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "classmerge {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run classmerge and assert it fails. Returns stderr as string.
pub fn classmerge_fails(dir: &Path, args: &[&str]) -> String {
    let out = classmerge_in(dir, args);
    assert!(
        !out.status.success(),
        "Expected classmerge {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}
