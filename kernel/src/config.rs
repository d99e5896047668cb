//! Boot-time configuration.
//!
//! Upstream Nachos reads subsystem selection from `-D` compiler flags
//! (`FILESYS`, `USER_PROGRAM`, `VM`, `USE_TLB`) and a handful of runtime
//! flags off `argv` (`-rs` random seed, `-d` debug flags). The compile-time
//! half stays compile-time here too (spec.md §6: "these are deployment
//! decisions, not runtime options") and is exposed as a `BootConfig` so the
//! rest of the kernel can match on it instead of scattering `cfg!` calls.
//! The runtime half — disk file path, number of physical pages, swap victim
//! policy seed — is parsed from `argv` in `main.rs` and threaded through the
//! same struct.

/// Page-replacement policy, selected at compile time via Cargo features
/// `policy-fifo` / `policy-clock` / `policy-random`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPolicy {
    Fifo,
    Clock,
    Random,
}

impl SwapPolicy {
    pub const fn compiled() -> Self {
        if cfg!(feature = "policy-clock") {
            SwapPolicy::Clock
        } else if cfg!(feature = "policy-random") {
            SwapPolicy::Random
        } else {
            SwapPolicy::Fifo
        }
    }
}

/// Which optional subsystems this build was compiled with.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub filesys: bool,
    pub userprog: bool,
    pub use_tlb: bool,
    pub demand_load: bool,
    pub swap: bool,
}

impl Features {
    pub const fn compiled() -> Self {
        Features {
            filesys: cfg!(feature = "filesys"),
            userprog: cfg!(feature = "userprog"),
            use_tlb: cfg!(feature = "use-tlb"),
            demand_load: cfg!(feature = "demand-load"),
            swap: cfg!(feature = "swap"),
        }
    }
}

/// Runtime knobs parsed from `argv`, paired with the compiled-in feature
/// set. Threaded explicitly through constructors rather than stashed in a
/// global, so tests can build as many independently-configured kernels as
/// they like in one process.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub features: Features,
    pub swap_policy: SwapPolicy,
    /// Number of physical frames the machine simulates. Nachos's default
    /// (`NumPhysPages` in `machine/machine.h`) is 32.
    pub num_phys_pages: usize,
    /// Path to the backing disk image file.
    pub disk_path: String,
    /// `-rs` seed for the random swap policy and any other place Nachos
    /// seeds its PRNG from the command line.
    pub random_seed: u64,
    /// `-f`: format the disk image instead of mounting an existing one.
    pub format: bool,
    /// The user program to run, if one was named on the command line
    /// (the one non-flag argument Nachos's own `argv` scan accepts).
    pub program: Option<String>,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            features: Features::compiled(),
            swap_policy: SwapPolicy::compiled(),
            num_phys_pages: 32,
            disk_path: "DISK".to_string(),
            random_seed: 0,
            format: false,
            program: None,
        }
    }
}

impl BootConfig {
    /// Parses a Nachos-style `argv`, falling back to defaults for anything
    /// not mentioned. Unrecognized flags are ignored, matching upstream's
    /// permissive `ASSERT`-free flag scan; the first bare (non-flag)
    /// argument is taken as the user program to run.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut config = BootConfig::default();
        let mut iter = args.into_iter().peekable();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-rs" => {
                    if let Some(seed) = iter.next() {
                        config.random_seed = seed.parse().unwrap_or(0);
                    }
                }
                "-d" | "--disk" => {
                    if let Some(path) = iter.next() {
                        config.disk_path = path;
                    }
                }
                "-np" | "--num-phys-pages" => {
                    if let Some(n) = iter.next() {
                        config.num_phys_pages = n.parse().unwrap_or(config.num_phys_pages);
                    }
                }
                "-f" => config.format = true,
                other if !other.starts_with('-') && config.program.is_none() => {
                    config.program = Some(other.to_string());
                }
                _ => {}
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_flag_and_program_name() {
        let config = BootConfig::from_args(["-f", "-rs", "7", "myprog"].map(String::from));
        assert!(config.format);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.program.as_deref(), Some("myprog"));
    }

    #[test]
    fn unrecognized_flags_are_ignored() {
        let config = BootConfig::from_args(["-x", "whatever"].map(String::from));
        assert_eq!(config.program.as_deref(), Some("whatever"));
    }
}
