use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::opcode::{OpCode, UNUSED};

use super::SxTape;

impl Serialize for SxTape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SxTape", 5)?;
        s.serialize_field("opcodes", &self.opcodes)?;
        s.serialize_field("arg_indices", &self.arg_indices)?;
        s.serialize_field("values", &self.values)?;
        s.serialize_field("num_inputs", &self.num_inputs)?;
        s.serialize_field("output_indices", &self.output_indices)?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for SxTape {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct TapeData {
            opcodes: Vec<OpCode>,
            arg_indices: Vec<[u32; 2]>,
            values: Vec<f64>,
            num_inputs: u32,
            output_indices: Vec<u32>,
        }

        let data = TapeData::deserialize(deserializer)?;
        let n = data.opcodes.len();
        if data.arg_indices.len() != n || data.values.len() != n || data.num_inputs as usize > n {
            return Err(serde::de::Error::custom("inconsistent SxTape lengths"));
        }
        for (i, (op, [a, b])) in data.opcodes.iter().zip(&data.arg_indices).enumerate() {
            let leaf = matches!(op, OpCode::Input | OpCode::Const);
            let input_slot = i < data.num_inputs as usize;
            if input_slot != (*op == OpCode::Input) {
                return Err(serde::de::Error::custom(format!("slot {} breaks the input-first layout", i)));
            }
            let arity_ok = if leaf {
                *a == UNUSED && *b == UNUSED
            } else {
                (*a as usize) < i && (*b == UNUSED) != op.is_binary() && (*b == UNUSED || (*b as usize) < i)
            };
            if !arity_ok {
                return Err(serde::de::Error::custom(format!("invalid operands at slot {}", i)));
            }
        }
        if data.output_indices.iter().any(|&o| o as usize >= n) {
            return Err(serde::de::Error::custom("output slot out of range"));
        }
        Ok(SxTape {
            opcodes: data.opcodes,
            arg_indices: data.arg_indices,
            values: data.values,
            num_inputs: data.num_inputs,
            output_indices: data.output_indices,
        })
    }
}
