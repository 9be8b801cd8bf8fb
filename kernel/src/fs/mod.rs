use std::path::Path;
use std::sync::Arc;

use component::fs::{
    Directory, FileHeader, OpenFile, PersistBitmap, SectorDevice, DIRECTORY_FILE_SIZE,
    DIRECTORY_SECTOR, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, NUM_DIR_ENTRIES, NUM_SECTORS,
    SECTOR_SIZE,
};
use logger::{debug, info, warn};

use crate::kernel::Kernel;

// 文件系统总控: 路径解析与 create/open/remove/list/print/put.
//
// 空闲扇区位图与根目录本身是两个普通文件, 文件头分别固定在
// 0 号和 1 号扇区, 内核在世期间二者始终保持打开.
// 修改成功的操作立即把位图/目录写回磁盘; 失败的操作丢弃改动
pub struct FileSystem {
    dev: Arc<dyn SectorDevice>,
    free_map_file: OpenFile,
    directory_file: OpenFile,
}

impl FileSystem {
    /// format 为真时重建空盘: 占住两个众所周知的扇区,
    /// 为位图文件与根目录文件分配数据扇区并全部落盘
    pub fn new(dev: Arc<dyn SectorDevice>, format: bool) -> Self {
        debug!("Initializing the file system");
        if format {
            let mut free_map = PersistBitmap::new(NUM_SECTORS);
            let directory = Directory::new(NUM_DIR_ENTRIES);
            let mut map_hdr = FileHeader::new();
            let mut dir_hdr = FileHeader::new();

            debug!("Formatting the file system");
            free_map.mark(FREE_MAP_SECTOR);
            free_map.mark(DIRECTORY_SECTOR);

            assert!(map_hdr.allocate(&mut free_map, FREE_MAP_FILE_SIZE));
            assert!(dir_hdr.allocate(&mut free_map, DIRECTORY_FILE_SIZE));

            // 先写文件头, Open 要从盘上读它们
            map_hdr.write_back(dev.as_ref(), FREE_MAP_SECTOR);
            dir_hdr.write_back(dev.as_ref(), DIRECTORY_SECTOR);

            let free_map_file = OpenFile::new(dev.clone(), FREE_MAP_SECTOR);
            let directory_file = OpenFile::new(dev.clone(), DIRECTORY_SECTOR);

            free_map.write_back(&free_map_file);
            directory.write_back(&directory_file);

            Self {
                dev,
                free_map_file,
                directory_file,
            }
        } else {
            let free_map_file = OpenFile::new(dev.clone(), FREE_MAP_SECTOR);
            let directory_file = OpenFile::new(dev.clone(), DIRECTORY_SECTOR);
            Self {
                dev,
                free_map_file,
                directory_file,
            }
        }
    }

    /// 路径末分量: 按 '/' 切分取最后一个, 根路径返回 "/"
    fn last_element(path: &str) -> String {
        path.split('/')
            .filter(|s| !s.is_empty())
            .last()
            .unwrap_or("/")
            .to_string()
    }

    /// 自根向下解析, 返回末分量所在目录的打开文件.
    /// 路径为空, 中间分量不存在或不是目录时返回 None
    fn find_sub_directory(&self, path: &str) -> Option<OpenFile> {
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if components.is_empty() {
            return None;
        }

        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        let mut cur: Option<OpenFile> = None;
        let mut sector: i32 = DIRECTORY_SECTOR as i32;
        let mut parent = "/";

        let mut idx = 0;
        while idx < components.len() {
            let child = components[idx];
            cur = Some(OpenFile::new(self.dev.clone(), sector as usize));
            if idx + 1 == components.len() {
                break;
            }

            directory.fetch_from(cur.as_ref().unwrap());
            match directory.find(child) {
                Some(s) => sector = s as i32,
                None => {
                    sector = -1;
                    break;
                }
            }

            parent = child;
            idx += 1;

            if !directory.is_dir(parent) {
                break;
            }
        }

        if sector == -1 || (parent != "/" && !directory.is_dir(parent)) {
            return None;
        }
        cur
    }

    /// 建文件或子目录. 步骤: 查重 -> 占文件头扇区 -> 登记目录项 ->
    /// 分配数据扇区 -> 依次把文件头, 目录, 位图落盘.
    /// 任一步失败回滚本操作已占用的位与目录项并返回 false
    pub fn create(&self, path: &str, initial_size: usize, is_dir: bool) -> bool {
        debug!("Creating file {} size {}", path, initial_size);
        let initial_size = if is_dir { DIRECTORY_FILE_SIZE } else { initial_size };

        let cur_directory_file = match self.find_sub_directory(path) {
            Some(file) => file,
            None => return false, // path is illegal
        };

        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        directory.fetch_from(&cur_directory_file);
        let name = Self::last_element(path);
        debug!("Added File/Directory: {}", name);

        if directory.find(&name).is_some() {
            return false; // file is already in directory
        }

        let mut free_map = PersistBitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);

        // 给文件头找一个扇区
        let sector = match free_map.find_and_set() {
            Some(sector) => sector,
            None => return false, // no free block for file header
        };

        if !directory.add(&name, sector, is_dir) {
            free_map.clear(sector); // no space in directory
            return false;
        }

        let mut hdr = FileHeader::new();
        if !hdr.allocate(&mut free_map, initial_size) {
            // no space on disk for data
            hdr.deallocate(&mut free_map);
            free_map.clear(sector);
            directory.remove(&name);
            return false;
        }

        // everything worked, flush all changes back to disk
        hdr.write_back(self.dev.as_ref(), sector);
        if is_dir {
            // 新目录的内容也要清干净, 数据扇区可能带着旧文件的残渣
            let fresh = Directory::new(NUM_DIR_ENTRIES);
            fresh.write_back(&OpenFile::new(self.dev.clone(), sector));
        }
        directory.write_back(&cur_directory_file);
        free_map.write_back(&self.free_map_file);
        true
    }

    /// 打开文件(目录不可打开), 找不到返回 None
    pub fn open(&self, path: &str) -> Option<OpenFile> {
        debug!("Opening file {}", path);
        let cur_directory_file = self.find_sub_directory(path)?;

        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        directory.fetch_from(&cur_directory_file);
        let name = Self::last_element(path);

        match directory.find(&name) {
            Some(sector) if !directory.is_dir(&name) => {
                Some(OpenFile::new(self.dev.clone(), sector))
            }
            _ => None,
        }
    }

    /// 删文件: 归还数据扇区与文件头扇区, 抹掉目录项, 改动落盘.
    /// 目录不允许删除(没有递归删除)
    pub fn remove(&self, path: &str) -> bool {
        let cur_directory_file = match self.find_sub_directory(path) {
            Some(file) => file,
            None => return false, // path is illegal
        };

        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        directory.fetch_from(&cur_directory_file);
        let name = Self::last_element(path);
        debug!("Remove File: {}", name);

        let sector = match directory.find(&name) {
            Some(sector) if !directory.is_dir(&name) => sector,
            _ => return false, // file not found
        };

        let mut hdr = FileHeader::new();
        hdr.fetch_from(self.dev.as_ref(), sector);

        let mut free_map = PersistBitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);

        hdr.deallocate(&mut free_map); // remove data blocks
        free_map.clear(sector); // remove header block
        directory.remove(&name);

        directory.write_back(&cur_directory_file); // flush to disk
        free_map.write_back(&self.free_map_file); // flush to disk
        true
    }

    /// 列目录内容; 路径指向文件时只打印该文件名
    pub fn list(&self, path: &str) {
        debug!("List file/directory: {}", path);
        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        let mut sector: i32 = -1;

        if path == "/" {
            sector = DIRECTORY_SECTOR as i32;
        } else if let Some(cur_directory_file) = self.find_sub_directory(path) {
            let name = Self::last_element(path);
            directory.fetch_from(&cur_directory_file);
            if let Some(s) = directory.find(&name) {
                if directory.is_dir(&name) {
                    sector = s as i32;
                } else {
                    println!("FILE {}", name);
                }
            }
        }

        if sector != -1 {
            let dir_file = OpenFile::new(self.dev.clone(), sector as usize);
            directory.fetch_from(&dir_file);
            for (name, is_dir, _) in directory.entries() {
                if is_dir {
                    println!("DIR  {}", name);
                } else {
                    println!("FILE {}", name);
                }
            }
        }
    }

    /// 打印整个文件系统: 两个常驻文件头, 位图, 根目录
    pub fn print(&self) {
        let mut bit_hdr = FileHeader::new();
        let mut dir_hdr = FileHeader::new();

        println!("Bit map file header:");
        bit_hdr.fetch_from(self.dev.as_ref(), FREE_MAP_SECTOR);
        self.print_header(&bit_hdr);

        println!("Directory file header:");
        dir_hdr.fetch_from(self.dev.as_ref(), DIRECTORY_SECTOR);
        self.print_header(&dir_hdr);

        let mut free_map = PersistBitmap::new(NUM_SECTORS);
        free_map.fetch_from(&self.free_map_file);
        let used: Vec<usize> = (0..NUM_SECTORS).filter(|&s| free_map.test(s)).collect();
        println!("Bitmap set bits: {:?}", used);

        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        directory.fetch_from(&self.directory_file);
        println!("Directory contents:");
        for (name, is_dir, sector) in directory.entries() {
            println!(
                "Name: {}, Type: {}, Sector: {}",
                name,
                if is_dir { "DIR" } else { "FILE" },
                sector
            );
        }
    }

    /// 打印单个文件的文件头与内容(cat)
    pub fn print_file(&self, path: &str) {
        debug!("Print content of file: {}", path);
        let cur_directory_file = match self.find_sub_directory(path) {
            Some(file) => file,
            None => return,
        };

        let mut directory = Directory::new(NUM_DIR_ENTRIES);
        directory.fetch_from(&cur_directory_file);
        let name = Self::last_element(path);

        if let Some(sector) = directory.find(&name) {
            if !directory.is_dir(&name) {
                let mut hdr = FileHeader::new();
                hdr.fetch_from(self.dev.as_ref(), sector);
                self.print_header(&hdr);
            }
        }
    }

    // 沿链打印每个文件头指向的扇区号与可打印内容
    fn print_header(&self, hdr: &FileHeader) {
        let mut cur = Some(hdr);
        while let Some(h) = cur {
            println!(
                "FileHeader contents.  File size: {}.  File blocks:",
                h.this_bytes()
            );
            let sectors: Vec<usize> = (0..h.num_sectors()).map(|i| h.data_sector(i)).collect();
            println!("{:?}", sectors);

            println!("File contents:");
            let mut remaining = h.this_bytes();
            let mut buf = [0u8; SECTOR_SIZE];
            for i in 0..h.num_sectors() {
                self.dev.read_sector(h.data_sector(i), &mut buf);
                let mut line = String::new();
                for &byte in buf.iter().take(remaining.min(SECTOR_SIZE)) {
                    if (0x20..=0x7e).contains(&byte) {
                        line.push(byte as char);
                    } else {
                        line.push_str(&format!("\\{:x}", byte));
                    }
                }
                println!("{}", line);
                remaining = remaining.saturating_sub(SECTOR_SIZE);
            }
            cur = h.next();
        }
    }

    /// 把宿主机文件导入到模拟文件系统(put)
    pub fn put(&self, local_path: &Path, nos_path: &str) -> bool {
        let data = match std::fs::read(local_path) {
            Ok(data) => data,
            Err(err) => {
                warn!("cannot read host file {}: {}", local_path.display(), err);
                return false;
            }
        };

        if !self.create(nos_path, data.len(), false) {
            warn!("cannot create {} in the simulated file system", nos_path);
            return false;
        }
        let file = match self.open(nos_path) {
            Some(file) => file,
            None => return false,
        };

        let written = file.write_at(&data, 0);
        info!(
            "put {} -> {}: {} of {} bytes",
            local_path.display(),
            nos_path,
            written,
            data.len()
        );
        written == data.len()
    }
}

impl Kernel {
    // 文件系统操作统一在关中断下执行, 内核内部对目录与位图的
    // 访问因此天然互斥
    pub fn fs_create(&self, path: &str, initial_size: usize, is_dir: bool) -> bool {
        let guard = self.intr_off();
        let result = self
            .file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").create(path, initial_size, is_dir));
        drop(guard);
        result
    }

    pub fn fs_open(&self, path: &str) -> Option<OpenFile> {
        let guard = self.intr_off();
        let result = self
            .file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").open(path));
        drop(guard);
        result
    }

    pub fn fs_remove(&self, path: &str) -> bool {
        let guard = self.intr_off();
        let result = self
            .file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").remove(path));
        drop(guard);
        result
    }

    pub fn fs_list(&self, path: &str) {
        let guard = self.intr_off();
        self.file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").list(path));
        drop(guard);
    }

    pub fn fs_print(&self) {
        let guard = self.intr_off();
        self.file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").print());
        drop(guard);
    }

    pub fn fs_cat(&self, path: &str) {
        let guard = self.intr_off();
        self.file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").print_file(path));
        drop(guard);
    }

    pub fn fs_put(&self, local_path: &Path, nos_path: &str) -> bool {
        let guard = self.intr_off();
        let result = self
            .file_system
            .exclusive_session(|fs| fs.as_ref().expect("file system not mounted").put(local_path, nos_path));
        drop(guard);
        result
    }
}
