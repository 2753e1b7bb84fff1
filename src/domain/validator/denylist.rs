//! The canonical set of function names inline endpoint code may never call.
//!
//! Matching is exact and case-sensitive on the bare identifier. Aliases, function
//! pointers (`Fn("exec")`) and other indirection are not resolved: the static check
//! is a first line of defence, the sandbox limits are the second.

pub const FORBIDDEN_FUNCTIONS: &[&str] = &[
    // Code execution
    "eval",
    "exec",
    "system",
    "passthru",
    "shell_exec",
    "proc_open",
    "popen",
    "pcntl_exec",
    // File operations
    "file_put_contents",
    "file_get_contents",
    "fopen",
    "fwrite",
    "file",
    "fputcsv",
    "fputs",
    // Network
    "curl_exec",
    "curl_multi_exec",
    // Information disclosure
    "phpinfo",
    "posix_mkfifo",
    "posix_getlogin",
    "posix_ttyname",
    "getenv",
    "get_current_user",
    "proc_get_status",
    "get_cfg_var",
    "disk_free_space",
    "disk_total_space",
    "diskfreespace",
    "getcwd",
    "getlastmo",
    "getmygid",
    "getmyinode",
    "getmypid",
    "getmyuid",
    // File system mutation
    "chgrp",
    "chmod",
    "chown",
    "copy",
    "link",
    "mkdir",
    "rename",
    "rmdir",
    "symlink",
    "tempnam",
    "touch",
    "unlink",
    "parse_ini_file",
    "show_source",
    // Raw database queries
    "mysqli_query",
    "mysqli_real_query",
    "mysqli_multi_query",
    "mysql_query",
    "pg_query",
    "pg_send_query",
    // Interpreter and process state
    "set_time_limit",
    "ini_set",
    "mail",
    "proc_nice",
    "proc_terminate",
    "proc_close",
    "pfsockopen",
    "fsockopen",
    "apache_child_terminate",
    "posix_kill",
    "posix_setpgid",
    "posix_setsid",
    "posix_setuid",
    // Extensions
    "dl",
    // Legacy crypto
    "mcrypt_encrypt",
    "mcrypt_decrypt",
    // Assertions
    "assert",
];

pub fn is_forbidden_name(name: &str) -> bool {
    FORBIDDEN_FUNCTIONS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        assert!(is_forbidden_name("exec"));
        assert!(is_forbidden_name("eval"));
        assert!(!is_forbidden_name("EXEC"));
        assert!(!is_forbidden_name("exec "));
        assert!(!is_forbidden_name("list_orders"));
    }

    #[test]
    fn denylist_has_no_duplicates() {
        let mut names: Vec<&str> = FORBIDDEN_FUNCTIONS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FORBIDDEN_FUNCTIONS.len());
    }
}
