//! 交互层入口。目前只有命令行一种交互。

pub mod cli;
