//! 网络层：站点常量、HTTP 客户端抽象、曲目页解析。

pub mod client;
pub mod resolver;
pub mod site;
