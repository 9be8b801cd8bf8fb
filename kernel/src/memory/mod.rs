pub mod address_space;
pub mod coremap;
pub mod frame;
pub mod page_table;
pub mod tlb;
