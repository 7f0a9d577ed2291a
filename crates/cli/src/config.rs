//! Top-level argument parsing and dispatch.

use crate::commands::Command;
use clap::Parser;

/// Manage consistent hashing rings.
#[derive(Parser, Debug)]
#[command(name = "ringctl", version, about)]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(self) -> anyhow::Result<()> {
        self.command.execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    #[test]
    fn test_subcommand_names_parse() {
        let config = CliConfig::try_parse_from([
            "ringctl", "create", "-a", "sha256", "-v", "6", "-p", "P1,P2", "-b", "memory",
        ])
        .unwrap();
        assert!(matches!(config.command, Command::Create { .. }));

        let config = CliConfig::try_parse_from([
            "ringctl",
            "get-vnode-pnode-and-data",
            "-v",
            "4",
            "-b",
            "log",
            "-l",
            "/tmp/ring",
        ])
        .unwrap();
        assert!(matches!(
            config.command,
            Command::GetVnodePnodeAndData { vnode: 4, .. }
        ));

        let config = CliConfig::try_parse_from([
            "ringctl",
            "remap-vnode",
            "-v",
            "0,2,4",
            "-p",
            "P3",
            "-o",
            "-b",
            "log",
            "-l",
            "/tmp/ring",
        ])
        .unwrap();
        match config.command {
            Command::RemapVnode { vnodes, pnode, output_ring, .. } => {
                assert_eq!(vnodes, vec![0, 2, 4]);
                assert_eq!(pnode, "P3");
                assert!(output_ring);
            }
            other => panic!("parsed into {:?}", other),
        }
    }

    #[test]
    fn test_print_hash_and_diff_take_positionals() {
        let config =
            CliConfig::try_parse_from(["ringctl", "print-hash", "-a", "sha1", "a-key"]).unwrap();
        assert!(matches!(config.command, Command::PrintHash { .. }));

        let config =
            CliConfig::try_parse_from(["ringctl", "diff", "ring_a.json", "ring_b.json"]).unwrap();
        assert!(matches!(config.command, Command::Diff { .. }));
    }
}
