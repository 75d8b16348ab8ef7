//! 命令行参数与服务配置默认值。

use clap::Parser;
use std::io;

pub const METADATA_FILE_NAME: &str = "metadata.json";
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_BLOCKED_EXTENSIONS: &str = "exe,bat,php";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filedrop", version, about = "Filedrop file sharing server")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "FILEDROP_UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory holding uploaded files and metadata.json"
    )]
    pub upload_dir: String,
    #[arg(
        long,
        env = "FILEDROP_ADMIN_PASSWORD",
        hide_env_values = true,
        help = "Shared secret for the admin panel"
    )]
    pub admin_password: String,
    #[arg(
        long,
        env = "FILEDROP_BLOCKED_EXTENSIONS",
        value_delimiter = ',',
        default_value = DEFAULT_BLOCKED_EXTENSIONS,
        help = "Comma separated file extensions refused on upload"
    )]
    pub blocked_extensions: Vec<String>,
    #[arg(
        short = 'b',
        long = "bind",
        env = "FILEDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILEDROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "FILEDROP_MAX_UPLOAD_SIZE",
        default_value_t = DEFAULT_MAX_UPLOAD_SIZE,
        help = "Max upload request size in bytes"
    )]
    pub max_upload_size: usize,
    #[arg(long, env = "FILEDROP_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}

impl Args {
    /// 校验启动参数：管理员密码不允许为空。
    pub fn validate(&self) -> io::Result<()> {
        if self.admin_password.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "admin password must not be empty (set FILEDROP_ADMIN_PASSWORD)",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_and_blocklist() {
        let args = Args::try_parse_from(["filedrop", "--admin-password", "s3cret"])
            .expect("parse args");
        assert_eq!(args.upload_dir, DEFAULT_UPLOAD_DIR);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.blocked_extensions, vec!["exe", "bat", "php"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn custom_blocklist_is_split_on_commas() {
        let args = Args::try_parse_from([
            "filedrop",
            "--admin-password",
            "s3cret",
            "--blocked-extensions",
            "sh,.JS",
        ])
        .expect("parse args");
        assert_eq!(args.blocked_extensions, vec!["sh", ".JS"]);
    }

    #[test]
    fn blank_password_fails_validation() {
        let args = Args::try_parse_from(["filedrop", "--admin-password", "  "]).expect("parse");
        let err = args.validate().expect_err("blank password");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
