use clap::{builder::BoolishValueParser, Args};

use crate::{
    config::{source, Resolver},
    error::Result,
    plugin::Build,
};

pub const DEFAULT_CONTEXT: &str = ".";

/// Flags for `docker build`. Most lists accept comma separated values.
#[derive(Debug, Args)]
#[command(next_help_heading = "Build")]
pub struct BuildArgs {
    /// Custom host-to-IP mappings (host:ip).
    #[arg(long = "build.add-hosts", value_delimiter = ',')]
    add_hosts: Option<Vec<String>>,

    /// Build-time variables.
    #[arg(long = "build.build-args", value_delimiter = ',')]
    build_args: Option<Vec<String>>,

    /// Images to consider as cache sources.
    #[arg(long = "build.cache-from", value_delimiter = ',')]
    cache_from: Option<Vec<String>>,

    /// Optional parent cgroup for the container.
    #[arg(long = "build.cgroup-parent")]
    cgroup_parent: Option<String>,

    /// Compress the build context using gzip.
    #[arg(
        long = "build.compress",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    compress: Option<bool>,

    /// The build context, a path or a URL.
    #[arg(long = "build.context")]
    context: Option<String>,

    /// CPU limits as JSON, e.g. `{"period": 100000, "quota": 50000}`.
    #[arg(long = "build.cpu")]
    cpu: Option<String>,

    /// Skip image verification.
    #[arg(
        long = "build.disable-content-trust",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    build_disable_content_trust: Option<bool>,

    /// Name of the Dockerfile.
    #[arg(long = "build.file")]
    file: Option<String>,

    /// Always remove intermediate containers.
    #[arg(
        long = "build.force-rm",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    force_rm: Option<bool>,

    /// Write the image ID to the file.
    #[arg(long = "build.image-id-file")]
    image_id_file: Option<String>,

    /// Container isolation technology.
    #[arg(long = "build.isolation")]
    isolation: Option<String>,

    /// Metadata for the image (key=value).
    #[arg(long = "build.labels", value_delimiter = ',')]
    labels: Option<Vec<String>>,

    /// Memory limits.
    #[arg(long = "build.memory", value_delimiter = ',')]
    memory: Option<Vec<String>>,

    /// Swap limits equal to memory plus swap, -1 for unlimited swap.
    #[arg(long = "build.memory-swaps", value_delimiter = ',')]
    memory_swaps: Option<Vec<String>>,

    /// Networking mode for the RUN instructions.
    #[arg(long = "build.network")]
    network: Option<String>,

    /// Do not use cache when building the image.
    #[arg(
        long = "build.no-cache",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    no_cache: Option<bool>,

    /// Output destination, e.g. `type=local,dest=path`. Repeat the flag for several
    /// destinations, one per line in the environment.
    #[arg(long = "build.outputs")]
    outputs: Option<Vec<String>>,

    /// Platform of the image if the server is multi-platform capable.
    #[arg(long = "build.platform")]
    platform: Option<String>,

    /// Type of progress output: auto, plain or tty.
    #[arg(long = "build.progress")]
    progress: Option<String>,

    /// Always attempt to pull a newer version of the image.
    #[arg(
        long = "build.pull",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pull: Option<bool>,

    /// Suppress the build output and print the image ID on success.
    #[arg(
        long = "build.quiet",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    quiet: Option<bool>,

    /// Remove intermediate containers after a successful build.
    #[arg(
        long = "build.remove",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    remove: Option<bool>,

    /// Repository prepended to tags that do not mention it.
    #[arg(long = "build.repo")]
    repo: Option<String>,

    /// Secret file to expose to the build, e.g. `id=mysecret,src=/local/secret`. Repeat the
    /// flag for several secrets, one per line in the environment.
    #[arg(long = "build.secrets")]
    secrets: Option<Vec<String>>,

    /// Security options.
    #[arg(long = "build.security-opts", value_delimiter = ',')]
    security_opts: Option<Vec<String>>,

    /// Sizes of /dev/shm.
    #[arg(long = "build.shm-sizes", value_delimiter = ',')]
    shm_sizes: Option<Vec<String>>,

    /// Squash newly built layers into a single new layer.
    #[arg(
        long = "build.squash",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    squash: Option<bool>,

    /// SSH agent sockets or keys to expose to the build.
    #[arg(long = "build.ssh-components", value_delimiter = ',')]
    ssh_components: Option<Vec<String>>,

    /// Stream attaches to the server to negotiate the build context.
    #[arg(
        long = "build.stream",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    stream: Option<bool>,

    /// Names and optionally tags of the image (name:tag).
    #[arg(long = "build.tags", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// The target build stage to build.
    #[arg(long = "build.target")]
    target: Option<String>,

    /// Ulimit options.
    #[arg(long = "build.ulimits", value_delimiter = ',')]
    ulimits: Option<Vec<String>>,
}

impl BuildArgs {
    pub fn resolve(self, resolver: &Resolver) -> Result<Build> {
        macro_rules! flag {
            ($value:expr, $name:literal, $file:literal, [$($env:literal),+]) => {
                resolver
                    .flag($value, &source!($name, $file, [$($env),+]))?
                    .unwrap_or_default()
            };
        }

        Ok(Build {
            add_hosts: resolver.list(
                self.add_hosts,
                &source!(
                    "build.add-hosts",
                    "build/add_hosts",
                    ["PARAMETER_ADD_HOSTS", "DOCKER_ADD_HOSTS"]
                ),
            ),
            build_args: resolver.list(
                self.build_args,
                &source!(
                    "build.build-args",
                    "build/build_args",
                    ["PARAMETER_BUILD_ARGS", "DOCKER_BUILD_ARGS"]
                ),
            ),
            cache_from: resolver.list(
                self.cache_from,
                &source!(
                    "build.cache-from",
                    "build/cache_from",
                    ["PARAMETER_CACHE_FROM", "DOCKER_CACHE_FROM"]
                ),
            ),
            cgroup_parent: resolver.string(
                self.cgroup_parent,
                &source!(
                    "build.cgroup-parent",
                    "build/cgroup_parent",
                    ["PARAMETER_CGROUP_PARENT", "DOCKER_CGROUP_PARENT"]
                ),
            ),
            compress: flag!(
                self.compress,
                "build.compress",
                "build/compress",
                ["PARAMETER_COMPRESS", "DOCKER_COMPRESS"]
            ),
            context: resolver
                .string(
                    self.context,
                    &source!(
                        "build.context",
                        "build/context",
                        ["PARAMETER_CONTEXT", "DOCKER_CONTEXT"]
                    ),
                )
                .unwrap_or_else(|| DEFAULT_CONTEXT.to_owned()),
            cpu: Default::default(),
            cpu_raw: resolver
                .string(
                    self.cpu,
                    &source!("build.cpu", "build/cpu", ["PARAMETER_CPU", "DOCKER_CPU"]),
                )
                .unwrap_or_default(),
            disable_content_trust: flag!(
                self.build_disable_content_trust,
                "build.disable-content-trust",
                "build/disable_content_trust",
                ["PARAMETER_DISABLE_CONTENT_TRUST", "DOCKER_DISABLE_CONTENT_TRUST"]
            ),
            file: resolver.string(
                self.file,
                &source!("build.file", "build/file", ["PARAMETER_FILE", "DOCKER_FILE"]),
            ),
            force_rm: flag!(
                self.force_rm,
                "build.force-rm",
                "build/force_rm",
                ["PARAMETER_FORCE_RM", "DOCKER_FORCE_RM"]
            ),
            image_id_file: resolver.string(
                self.image_id_file,
                &source!(
                    "build.image-id-file",
                    "build/image_id_file",
                    ["PARAMETER_IMAGE_ID_FILE", "DOCKER_IMAGE_ID_FILE"]
                ),
            ),
            isolation: resolver.string(
                self.isolation,
                &source!(
                    "build.isolation",
                    "build/isolation",
                    ["PARAMETER_ISOLATION", "DOCKER_ISOLATION"]
                ),
            ),
            labels: resolver.list(
                self.labels,
                &source!("build.labels", "build/labels", ["PARAMETER_LABELS", "DOCKER_LABELS"]),
            ),
            memory: resolver.list(
                self.memory,
                &source!("build.memory", "build/memory", ["PARAMETER_MEMORY", "DOCKER_MEMORY"]),
            ),
            memory_swaps: resolver.list(
                self.memory_swaps,
                &source!(
                    "build.memory-swaps",
                    "build/memory_swaps",
                    ["PARAMETER_MEMORY_SWAPS", "DOCKER_MEMORY_SWAPS"]
                ),
            ),
            network: resolver.string(
                self.network,
                &source!("build.network", "build/network", ["PARAMETER_NETWORK", "DOCKER_NETWORK"]),
            ),
            no_cache: flag!(
                self.no_cache,
                "build.no-cache",
                "build/no_cache",
                ["PARAMETER_NO_CACHE", "DOCKER_NO_CACHE"]
            ),
            outputs: resolver.lines(
                self.outputs,
                &source!("build.outputs", "build/outputs", ["PARAMETER_OUTPUTS", "DOCKER_OUTPUTS"]),
            ),
            platform: resolver.string(
                self.platform,
                &source!(
                    "build.platform",
                    "build/platform",
                    ["PARAMETER_PLATFORM", "DOCKER_PLATFORM"]
                ),
            ),
            progress: resolver.string(
                self.progress,
                &source!(
                    "build.progress",
                    "build/progress",
                    ["PARAMETER_PROGRESS", "DOCKER_PROGRESS"]
                ),
            ),
            pull: flag!(self.pull, "build.pull", "build/pull", ["PARAMETER_PULL", "DOCKER_PULL"]),
            quiet: flag!(
                self.quiet,
                "build.quiet",
                "build/quiet",
                ["PARAMETER_QUIET", "DOCKER_QUIET"]
            ),
            remove: flag!(
                self.remove,
                "build.remove",
                "build/remove",
                ["PARAMETER_REMOVE", "DOCKER_REMOVE"]
            ),
            repo: resolver.string(
                self.repo,
                &source!("build.repo", "build/repo", ["PARAMETER_REPO", "DOCKER_REPO"]),
            ),
            secrets: resolver.lines(
                self.secrets,
                &source!("build.secrets", "build/secrets", ["PARAMETER_SECRETS", "DOCKER_SECRETS"]),
            ),
            security_opts: resolver.list(
                self.security_opts,
                &source!(
                    "build.security-opts",
                    "build/security_opts",
                    ["PARAMETER_SECURITY_OPTS", "DOCKER_SECURITY_OPTS"]
                ),
            ),
            shm_sizes: resolver.list(
                self.shm_sizes,
                &source!(
                    "build.shm-sizes",
                    "build/shm_sizes",
                    ["PARAMETER_SHM_SIZES", "DOCKER_SHM_SIZES"]
                ),
            ),
            squash: flag!(
                self.squash,
                "build.squash",
                "build/squash",
                ["PARAMETER_SQUASH", "DOCKER_SQUASH"]
            ),
            ssh_components: resolver.list(
                self.ssh_components,
                &source!(
                    "build.ssh-components",
                    "build/ssh_components",
                    ["PARAMETER_SSH_COMPONENTS", "DOCKER_SSH_COMPONENTS"]
                ),
            ),
            stream: flag!(
                self.stream,
                "build.stream",
                "build/stream",
                ["PARAMETER_STREAM", "DOCKER_STREAM"]
            ),
            tags: resolver.list(
                self.tags,
                &source!("build.tags", "build/tags", ["PARAMETER_TAGS", "DOCKER_TAGS"]),
            ),
            target: resolver.string(
                self.target,
                &source!("build.target", "build/target", ["PARAMETER_TARGET", "DOCKER_TARGET"]),
            ),
            ulimits: resolver.list(
                self.ulimits,
                &source!("build.ulimits", "build/ulimits", ["PARAMETER_ULIMITS", "DOCKER_ULIMITS"]),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        build: BuildArgs,
    }

    fn resolve(args: &[&str], vars: &[(&str, &str)]) -> Result<Build> {
        let cli = Cli::try_parse_from(std::iter::once("docker-plugin").chain(args.iter().copied()))
            .unwrap();
        let resolver = Resolver::new(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
            Vec::<PathBuf>::new(),
        );
        cli.build.resolve(&resolver)
    }

    #[test]
    fn test_defaults() {
        let build = resolve(&[], &[]).unwrap();
        assert_eq!(build.context, ".");
        assert!(build.tags.is_empty());
        assert!(!build.pull);
        assert_eq!(build.file, None);
    }

    #[test]
    fn test_flags() {
        let build = resolve(
            &[
                "--build.tags",
                "latest,1.0",
                "--build.tags",
                "2.0",
                "--build.pull",
                "--build.squash",
                "false",
                "--build.file",
                "Dockerfile.other",
            ],
            &[("PARAMETER_SQUASH", "true")],
        )
        .unwrap();
        assert_eq!(build.tags, ["latest", "1.0", "2.0"]);
        assert!(build.pull);
        assert!(!build.squash);
        assert_eq!(build.file.as_deref(), Some("Dockerfile.other"));
    }

    #[test]
    fn test_environment() {
        let build = resolve(
            &[],
            &[
                ("DOCKER_TAGS", "latest,1.0"),
                ("PARAMETER_NO_CACHE", "yes"),
                ("PARAMETER_CPU", r#"{"shares": 512}"#),
                ("DOCKER_CONTEXT", "app"),
            ],
        )
        .unwrap();
        assert_eq!(build.tags, ["latest", "1.0"]);
        assert!(build.no_cache);
        assert_eq!(build.cpu_raw, r#"{"shares": 512}"#);
        assert_eq!(build.context, "app");
    }

    #[test]
    fn test_secrets_and_outputs_keep_commas() {
        let build = resolve(
            &[
                "--build.tags",
                "t",
                "--build.secrets",
                "id=mysecret,src=/local/secret",
                "--build.secrets",
                "id=other,src=/local/other",
            ],
            &[("DOCKER_OUTPUTS", "type=local,dest=path\ntype=tar,dest=out.tar")],
        )
        .unwrap();
        assert_eq!(
            build.secrets,
            ["id=mysecret,src=/local/secret", "id=other,src=/local/other"]
        );
        assert_eq!(build.outputs, ["type=local,dest=path", "type=tar,dest=out.tar"]);
        assert_eq!(
            build.command().to_string(),
            "/usr/local/bin/docker build --output type=local,dest=path \
             --output type=tar,dest=out.tar --secret id=mysecret,src=/local/secret \
             --secret id=other,src=/local/other --tag t ."
        );
    }

    #[test]
    fn test_secrets_from_environment() {
        let vars = [("PARAMETER_SECRETS", "id=mysecret,src=/local/secret")];
        let build = resolve(&[], &vars).unwrap();
        assert_eq!(build.secrets, ["id=mysecret,src=/local/secret"]);
    }

    #[test]
    fn test_invalid_boolean() {
        let error = resolve(&[], &[("DOCKER_PULL", "sometimes")]).unwrap_err();
        assert!(error.to_string().contains("build.pull"));
    }
}
