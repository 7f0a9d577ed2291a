//! Subcommand definitions and execution.
//!
//! Each subcommand opens (or creates) the ring, performs one operation,
//! and prints its result to stdout as JSON. Mutating subcommands accept
//! `-o` to also print the ring's canonical serialization afterwards.

use anyhow::Context;
use clap::{Args, Subcommand, ValueEnum};
use corelib::hasher::HashAlgorithm;
use corelib::{diff, BackendOptions, Ring, RingConfig, Topology};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Storage engine selection for `-b`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// In-process map; the ring vanishes when the command exits.
    Memory,
    /// Durable append-only log under `-l location`.
    Log,
}

/// The `-b`/`-l` pair shared by every store-touching subcommand.
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Storage backend.
    #[arg(short = 'b', long, value_enum, default_value_t = BackendKind::Log)]
    pub backend: BackendKind,
    /// Store location (required for the log backend).
    #[arg(short = 'l', long)]
    pub location: Option<PathBuf>,
}

impl StoreArgs {
    fn options(&self) -> anyhow::Result<BackendOptions> {
        match self.backend {
            BackendKind::Memory => Ok(BackendOptions::Memory),
            BackendKind::Log => {
                let location = self
                    .location
                    .clone()
                    .context("-l <location> is required for the log backend")?;
                Ok(BackendOptions::Log { location })
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new ring.
    Create {
        /// Hash algorithm (sha1, sha256, sha512).
        #[arg(short = 'a', long, default_value = "sha256")]
        algorithm: String,
        /// Vnode count, fixed for the ring's lifetime.
        #[arg(short = 'v', long)]
        vnodes: u32,
        /// Initial pnodes (comma-separated or repeated).
        #[arg(short = 'p', long = "pnode", value_delimiter = ',', required = true)]
        pnodes: Vec<String>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Rebuild a ring from a serialized topology file.
    DeserializeRing {
        /// Topology file; `-` reads stdin.
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Attach data to a vnode. The literal value `null` clears it.
    AddData {
        #[arg(short = 'v', long)]
        vnode: u32,
        #[arg(short = 'd', long)]
        data: String,
        /// Print the serialized ring after the mutation.
        #[arg(short = 'o', long)]
        output_ring: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Move vnodes onto a pnode, creating it if needed.
    RemapVnode {
        /// Vnode ids (comma-separated).
        #[arg(short = 'v', long = "vnode", value_delimiter = ',', required = true)]
        vnodes: Vec<u32>,
        /// Target pnode.
        #[arg(short = 'p', long)]
        pnode: String,
        /// Print the serialized ring after the mutation.
        #[arg(short = 'o', long)]
        output_ring: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Remove a pnode that owns no vnodes.
    RemovePnode {
        #[arg(short = 'p', long)]
        pnode: String,
        /// Print the serialized ring after the mutation.
        #[arg(short = 'o', long)]
        output_ring: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// List the pnode set.
    GetPnodes {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// List the vnodes owned by a pnode.
    GetVnodes {
        #[arg(short = 'p', long)]
        pnode: String,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show the owner and data of one vnode.
    GetVnodePnodeAndData {
        #[arg(short = 'v', long)]
        vnode: u32,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// List the vnodes carrying operator data.
    GetDataVnodes {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Resolve a key to its pnode, vnode, and data.
    GetNode {
        key: String,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Hash a key and print the digest (and its vnode, given a count).
    PrintHash {
        /// Hash algorithm (sha1, sha256, sha512).
        #[arg(short = 'a', long, default_value = "sha256")]
        algorithm: String,
        /// Vnode count; when given, the digest's vnode is printed too.
        #[arg(short = 'v', long)]
        vnodes: Option<u32>,
        key: String,
    },
    /// Diff two serialized topology files.
    Diff {
        file_a: PathBuf,
        file_b: PathBuf,
    },
}

impl Command {
    pub fn execute(self) -> anyhow::Result<()> {
        match self {
            Command::Create {
                algorithm,
                vnodes,
                pnodes,
                store,
            } => {
                let ring = Ring::create(
                    RingConfig {
                        algorithm: algorithm.parse::<HashAlgorithm>()?,
                        vnodes,
                        pnodes,
                    },
                    store.options()?,
                )?;
                println!("{}", ring.serialize()?);
                ring.close()?;
            }
            Command::DeserializeRing { file, store } => {
                let topology_json = read_input(&file)?;
                let ring = Ring::deserialize(&topology_json, store.options()?)?;
                println!("{}", ring.serialize()?);
                ring.close()?;
            }
            Command::AddData {
                vnode,
                data,
                output_ring,
                store,
            } => {
                let ring = Ring::open(store.options()?)?;
                ring.add_data(vnode, Some(&data))?;
                finish_mutation(ring, output_ring)?;
            }
            Command::RemapVnode {
                vnodes,
                pnode,
                output_ring,
                store,
            } => {
                let ring = Ring::open(store.options()?)?;
                let change = ring.remap(&pnode, &vnodes)?;
                println!("{}", serde_json::to_string(&change)?);
                finish_mutation(ring, output_ring)?;
            }
            Command::RemovePnode {
                pnode,
                output_ring,
                store,
            } => {
                let ring = Ring::open(store.options()?)?;
                ring.remove_pnode(&pnode)?;
                finish_mutation(ring, output_ring)?;
            }
            Command::GetPnodes { store } => {
                let ring = Ring::open(store.options()?)?;
                println!("{}", serde_json::to_string(&ring.get_pnodes())?);
                ring.close()?;
            }
            Command::GetVnodes { pnode, store } => {
                let ring = Ring::open(store.options()?)?;
                println!("{}", serde_json::to_string(&ring.get_vnodes(&pnode)?)?);
                ring.close()?;
            }
            Command::GetVnodePnodeAndData { vnode, store } => {
                let ring = Ring::open(store.options()?)?;
                println!(
                    "{}",
                    serde_json::to_string(&ring.get_vnode_pnode_and_data(vnode)?)?
                );
                ring.close()?;
            }
            Command::GetDataVnodes { store } => {
                let ring = Ring::open(store.options()?)?;
                println!("{}", serde_json::to_string(&ring.get_data_vnodes())?);
                ring.close()?;
            }
            Command::GetNode { key, store } => {
                let ring = Ring::open(store.options()?)?;
                println!("{}", serde_json::to_string(&ring.get_node(key.as_bytes()))?);
                ring.close()?;
            }
            Command::PrintHash {
                algorithm,
                vnodes,
                key,
            } => {
                let algorithm: HashAlgorithm = algorithm.parse()?;
                let digest = algorithm.digest(key.as_bytes()).to_hex_lower();
                let mut out = serde_json::json!({
                    "algorithm": algorithm.name(),
                    "hash": digest,
                });
                if let Some(vnodes) = vnodes {
                    let space = corelib::HashSpace::new(algorithm, vnodes)?;
                    out["vnode"] = space.vnode_of(key.as_bytes()).into();
                }
                println!("{}", serde_json::to_string(&out)?);
            }
            Command::Diff { file_a, file_b } => {
                let a = Topology::from_json(&read_input(&file_a)?)?;
                let b = Topology::from_json(&read_input(&file_b)?)?;
                println!("{}", serde_json::to_string(&diff(&a, &b)?)?);
            }
        }
        Ok(())
    }
}

fn finish_mutation(ring: Ring, output_ring: bool) -> anyhow::Result<()> {
    if output_ring {
        println!("{}", ring.serialize()?);
    }
    ring.close()?;
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading topology from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading topology from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_store(dir: &Path) -> StoreArgs {
        StoreArgs {
            backend: BackendKind::Log,
            location: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn test_create_mutate_query_on_log_backend() {
        let dir = tempfile::tempdir().unwrap();
        Command::Create {
            algorithm: "sha256".into(),
            vnodes: 6,
            pnodes: vec!["P1".into(), "P2".into()],
            store: log_store(dir.path()),
        }
        .execute()
        .unwrap();

        Command::RemapVnode {
            vnodes: vec![0, 2],
            pnode: "P3".into(),
            output_ring: true,
            store: log_store(dir.path()),
        }
        .execute()
        .unwrap();

        Command::GetVnodes {
            pnode: "P3".into(),
            store: log_store(dir.path()),
        }
        .execute()
        .unwrap();
    }

    #[test]
    fn test_memory_backend_needs_no_location() {
        Command::Create {
            algorithm: "sha256".into(),
            vnodes: 4,
            pnodes: vec!["P1".into()],
            store: StoreArgs {
                backend: BackendKind::Memory,
                location: None,
            },
        }
        .execute()
        .unwrap();
    }

    #[test]
    fn test_log_backend_requires_location() {
        let err = Command::GetPnodes {
            store: StoreArgs {
                backend: BackendKind::Log,
                location: None,
            },
        }
        .execute()
        .unwrap_err();
        assert!(err.to_string().contains("location"));
    }
}
