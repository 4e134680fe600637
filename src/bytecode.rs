#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ByteCode {
    GetGlobal(u8, u8),
    LoadConst(u8, u8),
    LoadNil(u8),
    LoadBool(u8, bool),
    LoadInt(u8, i16),
    Move(u8, u8),
    // load a nested block prototype as a closure value
    Closure(u8, u8),
    Call(u8, u8),
}
