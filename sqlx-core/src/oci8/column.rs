use crate::column::Column;
use crate::oci8::native::ColumnDescription;
use crate::oci8::Oci8TypeInfo;

#[derive(Debug, Clone)]
pub struct Oci8Column {
    pub(crate) name: String,
    pub(crate) ordinal: usize,
    pub(crate) type_info: Oci8TypeInfo,
    pub(crate) nullable: bool,
}

impl Oci8Column {
    pub(crate) fn from_description(ordinal: usize, desc: &ColumnDescription) -> Self {
        Self {
            name: desc.name.clone(),
            ordinal,
            type_info: Oci8TypeInfo::from_description(desc),
            nullable: desc.nullable,
        }
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

impl Column for Oci8Column {
    type TypeInfo = Oci8TypeInfo;

    fn ordinal(&self) -> usize {
        self.ordinal
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn type_info(&self) -> &Oci8TypeInfo {
        &self.type_info
    }
}
