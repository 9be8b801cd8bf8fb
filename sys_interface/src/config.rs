//! 用户程序可见的各种限制

// 单线程同时打开的文件数上限
pub const MAX_NUM_USER_OPEN_FILES: usize = 5;

// 系统调用传入的路径字符串长度上限(不含结尾 NUL)
pub const MAX_PATH_LEN: usize = 255;

// 路径中单个分量的长度上限(不含结尾 NUL)
pub const FILE_NAME_MAX_LEN: usize = 9;
