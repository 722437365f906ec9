//! Pre-execution static security scan. Runs before any submission reaches
//! a subprocess — a pattern match is cheap insurance against the most
//! common escape attempts; the subprocess's own missing network/filesystem
//! access is the real boundary.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityViolation {
    FilesystemAccess,
    ProcessSpawn,
    NetworkAccess,
    DynamicCodeExecution,
    SystemModuleImport,
}

impl fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SecurityViolation::FilesystemAccess => "code attempts filesystem access",
            SecurityViolation::ProcessSpawn => "code attempts to spawn a subprocess",
            SecurityViolation::NetworkAccess => "code attempts network access",
            SecurityViolation::DynamicCodeExecution => "code attempts dynamic code execution",
            SecurityViolation::SystemModuleImport => "code imports a disallowed system module",
        };
        write!(f, "{msg}")
    }
}

struct Rule {
    needle: &'static str,
    violation: SecurityViolation,
}

const PYTHON_RULES: &[Rule] = &[
    Rule { needle: "import os", violation: SecurityViolation::SystemModuleImport },
    Rule { needle: "import sys", violation: SecurityViolation::SystemModuleImport },
    Rule { needle: "import subprocess", violation: SecurityViolation::ProcessSpawn },
    Rule { needle: "import socket", violation: SecurityViolation::NetworkAccess },
    Rule { needle: "import shutil", violation: SecurityViolation::FilesystemAccess },
    Rule { needle: "open(", violation: SecurityViolation::FilesystemAccess },
    Rule { needle: "__import__", violation: SecurityViolation::DynamicCodeExecution },
    Rule { needle: "eval(", violation: SecurityViolation::DynamicCodeExecution },
    Rule { needle: "exec(", violation: SecurityViolation::DynamicCodeExecution },
];

const JAVASCRIPT_RULES: &[Rule] = &[
    Rule { needle: "require('fs')", violation: SecurityViolation::FilesystemAccess },
    Rule { needle: "require(\"fs\")", violation: SecurityViolation::FilesystemAccess },
    Rule { needle: "require('child_process')", violation: SecurityViolation::ProcessSpawn },
    Rule { needle: "require(\"child_process\")", violation: SecurityViolation::ProcessSpawn },
    Rule { needle: "require('net')", violation: SecurityViolation::NetworkAccess },
    Rule { needle: "process.binding", violation: SecurityViolation::SystemModuleImport },
    Rule { needle: "eval(", violation: SecurityViolation::DynamicCodeExecution },
    Rule { needle: "new Function(", violation: SecurityViolation::DynamicCodeExecution },
];

pub fn scan_for_violations(language: &str, code: &str) -> Option<SecurityViolation> {
    let rules: &[Rule] = match language {
        "python" => PYTHON_RULES,
        "javascript" | "typescript" => JAVASCRIPT_RULES,
        _ => return None,
    };

    rules.iter().find(|r| code.contains(r.needle)).map(|r| r.violation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_process_spawn_attempts() {
        let code = "import subprocess\nsubprocess.run(['ls'])";
        assert_eq!(scan_for_violations("python", code), Some(SecurityViolation::ProcessSpawn));
    }

    #[test]
    fn allows_clean_solutions() {
        let code = "def solve(a, b):\n    return a + b\n";
        assert_eq!(scan_for_violations("python", code), None);
    }
}
