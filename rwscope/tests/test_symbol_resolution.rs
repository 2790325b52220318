use std::io::Write;

use rwscope::domain::{KernelError, Syscall};
use rwscope::kernel::symbols::syscall_candidates;
use rwscope::kernel::SymbolTable;

const ARM64_KALLSYMS: &str = "\
ffff800010000000 T _text
ffff8000102a1b40 T __arm64_sys_read
ffff8000102a1c80 T __arm64_sys_readv
ffff8000102a1dc0 T __arm64_sys_write
ffff800008e51000 t xfs_file_read_iter\t[xfs]
";

#[test]
fn test_resolves_from_kallsyms_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(ARM64_KALLSYMS.as_bytes()).unwrap();

    let table = SymbolTable::load(file.path()).unwrap();

    assert_eq!(table.len(), 5);
    assert_eq!(table.resolve_syscall(Syscall::Read).unwrap(), "__arm64_sys_read");
    assert_eq!(table.resolve_syscall(Syscall::Write).unwrap(), "__arm64_sys_write");
}

#[test]
fn test_candidates_cover_supported_architectures() {
    let candidates: Vec<String> = syscall_candidates(Syscall::Write).collect();
    assert_eq!(
        candidates,
        vec!["__x64_sys_write", "__arm64_sys_write", "__arm_sys_write", "sys_write"]
    );
}

#[test]
fn test_empty_table_has_no_syscalls() {
    let table = SymbolTable::parse("");
    assert!(table.is_empty());
    assert!(matches!(
        table.resolve_syscall(Syscall::Write),
        Err(KernelError::SymbolNotFound("write"))
    ));
}
