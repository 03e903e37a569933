use indexfs::io::MemoryDiskBuilder;
use indexfs::{AccessMode, FileSystem};

pub fn main() -> indexfs::Result<()> {
    let dev = MemoryDiskBuilder::new()
        .with_capacity(64 * 1024)
        .with_block_size(512)
        .build()?;

    // create a new file system on the device and populate a small tree
    let mut fs = FileSystem::create(dev)?;
    fs.create_directory("notes")?;
    fs.change_directory("notes")?;
    fs.allocate_file("todo.txt", b"buy milk\nfix the bitmap\n", AccessMode::ReadWrite)?;
    fs.copy_file("todo.txt", ".")?;
    fs.change_directory("..")?;
    fs.copy_directory("notes", "/root", None)?;

    for entry in fs.list_directory()? {
        println!("{}", entry);
    }
    fs.change_directory("/root/notes_copy1")?;
    for entry in fs.list_directory()? {
        println!("  {}", entry);
    }
    println!(
        "{}: {} of {} blocks free",
        fs.current_path()?,
        fs.free_blocks(),
        fs.total_blocks()
    );

    let tmp = std::env::temp_dir().join("indexfs-demo.img");
    fs.save_to_path(&tmp)?;
    let restored = FileSystem::load_from_path(&tmp)?;
    println!("restored snapshot at {}", restored.current_path()?);
    std::fs::remove_file(tmp)?;
    Ok(())
}
