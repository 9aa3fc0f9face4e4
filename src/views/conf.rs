//! Configuration trees from `ls_getconf`.
//!
//! Nodes link to each other through left, right and forward pointers that
//! may share targets or form cycles. The tree is walked breadth first and
//! every native node address is visited once.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::assemble::Assembler;
use super::{ConfCondition, ConfNodeView, ConfTree, NodeId};
use crate::decoder::{CountSource, LazyText, NativeAddr};
use crate::error::DecodeError;

struct Walk {
    ids: HashMap<NativeAddr, NodeId>,
    queue: VecDeque<NativeAddr>,
    limit: usize,
}

impl Walk {
    fn new(limit: usize) -> Self {
        Self { ids: HashMap::new(), queue: VecDeque::new(), limit }
    }

    /// Arena slot for the node at `addr`, queueing it on first sight.
    fn intern(&mut self, link: &'static str, addr: NativeAddr) -> Result<Option<NodeId>, DecodeError> {
        if addr.is_null() {
            return Ok(None);
        }
        if let Some(&id) = self.ids.get(&addr) {
            debug!(link, node = %addr, id = id.0, "link to a node already in the tree");
            return Ok(Some(id));
        }
        if self.ids.len() >= self.limit {
            return Err(DecodeError::CountExceedsLimit {
                field: "confNode",
                count: i32::try_from(self.ids.len() + 1).unwrap_or(i32::MAX),
                limit: self.limit,
            });
        }
        let id = NodeId(self.ids.len());
        self.ids.insert(addr, id);
        self.queue.push_back(addr);
        Ok(Some(id))
    }
}

pub fn conf_tree(asm: &Assembler<'_>, addr: NativeAddr) -> Result<ConfTree, DecodeError> {
    let layouts = asm.layouts();
    let conf = asm.load(addr, &layouts.ls_conf)?;

    let names = asm.defer_array::<LazyText>(&conf, "conds", "conds", CountSource::Sibling("numConds"))?;
    let values = asm.defer_array::<i32>(&conf, "values", (), CountSource::Sibling("numConds"))?;
    let names = asm.resolve_counted(&conf, names)?;
    let values = asm.resolve_counted(&conf, values)?;
    let conditions = asm
        .resolve_texts(names)?
        .into_iter()
        .zip(values)
        .map(|(name, value)| ConfCondition { name, value })
        .collect();

    let handle_addr = conf.ptr("confhandle")?;
    if handle_addr.is_null() {
        return Ok(ConfTree { file: None, line_count: 0, conditions, root: None, nodes: Vec::new() });
    }
    let handle = asm.load(handle_addr, &layouts.conf_handle)?;

    let mut walk = Walk::new(asm.max_elements());
    let root = walk.intern("rootNode", handle.ptr("rootNode")?)?;
    let mut nodes = Vec::new();
    while let Some(node_addr) = walk.queue.pop_front() {
        let node = asm.load(node_addr, &layouts.conf_node)?;
        nodes.push(ConfNodeView {
            left: walk.intern("leftPtr", node.ptr("leftPtr")?)?,
            right: walk.intern("rightPtr", node.ptr("rightPtr")?)?,
            forward: walk.intern("fwPtr", node.ptr("fwPtr")?)?,
            condition: asm.text(&node, "cond")?,
            begin_line: node.i32("beginLineNum")?,
            lines: asm.string_list(&node, "lines", "numLines")?,
            tag: node.u8("tag")?,
        });
    }

    Ok(ConfTree {
        file: asm.text(&handle, "fname")?,
        line_count: handle.i32("lineCount")?,
        conditions,
        root,
        nodes,
    })
}
